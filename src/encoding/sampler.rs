//! Fixed-interval sampling timer.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Cancellable periodic tick source owned by the streaming state.
///
/// While stopped, [`SamplingTimer::tick`] never completes, so it can sit
/// in a `select!` unconditionally. Late ticks are skipped rather than
/// replayed in a burst.
#[derive(Debug)]
pub struct SamplingTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl SamplingTimer {
    /// Creates a stopped timer. Periods under a millisecond are raised to one.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
        }
    }

    /// Starts (or restarts) ticking one period from now.
    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        tracing::debug!(period_ms = self.period.as_millis() as u64, "Sampling started");
    }

    /// Stops ticking. Returns true if the timer was running.
    pub fn cancel(&mut self) -> bool {
        let was_running = self.interval.take().is_some();
        if was_running {
            tracing::debug!("Sampling cancelled");
        }
        was_running
    }

    /// True between `start` and `cancel`.
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Waits for the next tick; pends forever while cancelled.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
