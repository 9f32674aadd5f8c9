//! Distance readings and their presentation.
//!
//! Readings arrive from the detector in meters. They are kept in a
//! bounded [`HistoryBuffer`] and converted to a [`DisplayUnit`] only when
//! rendered.

mod history;
pub mod units;

pub use history::{HistoryBuffer, HistoryEntry, HISTORY_CAPACITY};
pub use units::{to_display, DisplayUnit};

/// One reading from the remote detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Distance in meters. Negative means no face was found in the frame.
    pub distance_meters: f64,
    /// Annotated frame as base64 JPEG, if the detector sent one.
    pub annotated_image: Option<String>,
}

impl Measurement {
    /// Returns true if the reading carries an actual distance.
    pub fn is_detection(&self) -> bool {
        self.distance_meters >= 0.0
    }
}
