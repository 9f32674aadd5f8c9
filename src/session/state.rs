//! Session states and the published snapshot.

use crate::measurement::{to_display, DisplayUnit, HistoryEntry};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a detection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Camera acquisition in flight.
    Starting,
    /// Camera live; channel connecting or open.
    Streaming,
    /// Camera or channel failure; start again to retry.
    Error,
    /// Stopped by the user; all resources released.
    Stopped,
}

impl SessionState {
    /// True while the session holds (or is acquiring) the camera.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Running counters for one session object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Frames handed to the connection.
    pub frames_sent: u64,
    /// Ticks that produced no outbound frame.
    pub frames_skipped: u64,
    /// Readings with a non-negative distance.
    pub measurements: u64,
    /// Readings carrying the "no face" sentinel.
    pub empty_readings: u64,
    /// Detector payloads that could not be interpreted.
    pub malformed_messages: u64,
    /// Transitions into the error state.
    pub errors: u64,
}

/// Latest annotated frame returned by the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedFrame {
    /// Reading the frame was annotated with; may be the sentinel.
    pub distance_meters: f64,
    /// Base64 JPEG.
    pub image: String,
}

/// Everything the presentation layer needs to render the session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// True only while streaming.
    pub is_detecting: bool,
    /// Last non-negative distance in meters.
    pub distance_meters: f64,
    /// Unit for rendering distances.
    pub unit: DisplayUnit,
    /// Up to ten most recent readings, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Message shown to the user, if any.
    pub last_error: Option<String>,
    /// Most recent frame drawn by the detector.
    pub annotated: Option<AnnotatedFrame>,
    /// Running counters.
    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// Current distance in the selected unit, e.g. `1.50 m`.
    pub fn display_distance(&self) -> String {
        format!("{} {}", to_display(self.distance_meters, self.unit), self.unit)
    }
}
