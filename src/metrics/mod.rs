//! Prometheus metrics for the detection session.
//!
//! # Metrics Exposed
//!
//! - `face_distance_streaming` - 1 while streaming, else 0
//! - `face_distance_session_errors_total` - transitions into the error state
//! - `face_distance_frames_sent_total` - frames handed to the detector
//! - `face_distance_frames_skipped_total` - ticks that sent nothing
//! - `face_distance_measurements_total` - distance readings received
//! - `face_distance_empty_readings_total` - "no face" replies
//! - `face_distance_malformed_messages_total` - unparseable detector messages
//! - `face_distance_distance_meters` - latest distance
//! - `face_distance_history_len` - entries in the history buffer
//!
//! The HTTP exporter is only built with the `metrics` feature.

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
