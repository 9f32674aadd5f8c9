//! Metrics collection and registry.

use crate::session::{SessionSnapshot, SessionState};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for a detection session.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    streaming: IntGauge,
    errors_total: IntCounter,

    // Frame metrics
    frames_sent_total: IntCounter,
    frames_skipped_total: IntCounter,

    // Detector reply metrics
    measurements_total: IntCounter,
    empty_readings_total: IntCounter,
    malformed_messages_total: IntCounter,
    distance_meters: Gauge,
    history_len: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let streaming = IntGauge::new(
            "face_distance_streaming",
            "Whether the session is streaming (1=streaming, 0=not)",
        )?;
        let errors_total = IntCounter::new(
            "face_distance_session_errors_total",
            "Transitions into the error state",
        )?;
        let frames_sent_total = IntCounter::new(
            "face_distance_frames_sent_total",
            "Frames handed to the detector connection",
        )?;
        let frames_skipped_total = IntCounter::new(
            "face_distance_frames_skipped_total",
            "Sampling ticks that sent no frame",
        )?;
        let measurements_total = IntCounter::new(
            "face_distance_measurements_total",
            "Distance readings received",
        )?;
        let empty_readings_total = IntCounter::new(
            "face_distance_empty_readings_total",
            "Replies reporting no face in the frame",
        )?;
        let malformed_messages_total = IntCounter::new(
            "face_distance_malformed_messages_total",
            "Detector messages that could not be parsed",
        )?;
        let distance_meters = Gauge::new(
            "face_distance_distance_meters",
            "Most recent distance reading in meters",
        )?;
        let history_len = IntGauge::new(
            "face_distance_history_len",
            "Readings currently held in the history buffer",
        )?;

        registry.register(Box::new(streaming.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(frames_sent_total.clone()))?;
        registry.register(Box::new(frames_skipped_total.clone()))?;
        registry.register(Box::new(measurements_total.clone()))?;
        registry.register(Box::new(empty_readings_total.clone()))?;
        registry.register(Box::new(malformed_messages_total.clone()))?;
        registry.register(Box::new(distance_meters.clone()))?;
        registry.register(Box::new(history_len.clone()))?;

        Ok(Self {
            registry,
            streaming,
            errors_total,
            frames_sent_total,
            frames_skipped_total,
            measurements_total,
            empty_readings_total,
            malformed_messages_total,
            distance_meters,
            history_len,
        })
    }

    /// Updates all metrics from a session snapshot.
    pub fn update(&self, snapshot: &SessionSnapshot) {
        self.streaming
            .set(i64::from(snapshot.state == SessionState::Streaming));
        self.distance_meters.set(snapshot.distance_meters);
        self.history_len.set(snapshot.history.len() as i64);

        // Session counters only grow; catch the registry up to them.
        let stats = &snapshot.stats;
        advance(&self.errors_total, stats.errors);
        advance(&self.frames_sent_total, stats.frames_sent);
        advance(&self.frames_skipped_total, stats.frames_skipped);
        advance(&self.measurements_total, stats.measurements);
        advance(&self.empty_readings_total, stats.empty_readings);
        advance(&self.malformed_messages_total, stats.malformed_messages);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}
