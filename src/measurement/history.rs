//! Rolling history of recent distance readings.

use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;

/// Maximum number of readings kept.
pub const HISTORY_CAPACITY: usize = 10;

/// One recorded reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Local wall-clock time of the reading (`HH:MM:SS`).
    pub timestamp: String,
    /// Distance in meters.
    pub distance_meters: f64,
}

/// Bounded, insertion-ordered buffer of readings.
///
/// Once full, each new reading evicts the oldest one.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Records a reading stamped with the current local time.
    pub fn record(&mut self, distance_meters: f64) {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.push(HistoryEntry {
            timestamp,
            distance_meters,
        });
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Copies the entries out, oldest first.
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries, at most [`HISTORY_CAPACITY`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True before the first reading.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry, if any.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_appends_in_order() {
        let mut history = HistoryBuffer::new();
        history.record(1.5);
        history.record(0.75);

        let distances: Vec<f64> = history.iter().map(|e| e.distance_meters).collect();
        assert_eq!(distances, vec![1.5, 0.75]);
        assert_eq!(history.latest().map(|e| e.distance_meters), Some(0.75));
        assert_eq!(history.latest().map(|e| e.timestamp.len()), Some(8));
    }

    #[test]
    fn test_twelve_readings_keep_last_ten() {
        let mut history = HistoryBuffer::new();
        for i in 0..12 {
            history.record(i as f64);
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        let distances: Vec<f64> = history.iter().map(|e| e.distance_meters).collect();
        let expected: Vec<f64> = (2..12).map(|i| i as f64).collect();
        assert_eq!(distances, expected);
    }

    proptest! {
        #[test]
        fn prop_keeps_last_n_in_order(values in prop::collection::vec(0.0f64..10.0, 0..40)) {
            let mut history = HistoryBuffer::new();
            for v in &values {
                history.record(*v);
            }

            prop_assert_eq!(history.len(), values.len().min(HISTORY_CAPACITY));
            let tail = &values[values.len().saturating_sub(HISTORY_CAPACITY)..];
            let stored: Vec<f64> = history.iter().map(|e| e.distance_meters).collect();
            prop_assert_eq!(stored.as_slice(), tail);
        }
    }
}
