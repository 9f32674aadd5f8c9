//! Face Distance Client Library
//!
//! Streams live camera frames to a remote face-distance detector over a
//! WebSocket, and keeps the returned readings for display.
//!
//! # Architecture
//!
//! ```text
//! capture ─▶ encoding ─▶ channel ─▶ detector
//!                           │
//!                           ▼
//!          session (state machine) ─▶ measurement (history, units)
//!                           │
//!                           ▼
//!                   snapshot ─▶ presenter / metrics
//! ```
//!
//! # Design Principles
//!
//! - **One owner**: the [`Session`] exclusively owns the camera, the
//!   detector connection and the sampling timer
//! - **Blocking stays off the loop**: the camera runs on its own thread;
//!   the event loop only waits on channels and timers
//! - **Lossy sampling**: frames the connection cannot take right away are
//!   dropped, never queued
//! - **No silent reconnects**: a lost connection is reported and the user
//!   restarts explicitly
//! - **Meters everywhere**: display units are applied only when rendering
//!
//! # Example
//!
//! ```no_run
//! use face_distance::{MockCamera, Session, SessionSettings};
//!
//! # async fn demo() {
//! let (mut session, handle) = Session::new(MockCamera::new(), SessionSettings::default());
//! handle.toggle_detection();
//!
//! let watcher = handle.clone();
//! tokio::join!(session.run(), async move {
//!     let mut watcher = watcher;
//!     if let Some(snapshot) = watcher.wait_for(|s| !s.history.is_empty()).await {
//!         println!("Distance: {}", snapshot.display_distance());
//!     }
//!     watcher.teardown();
//! });
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod channel;
pub mod config;
pub mod encoding;
pub mod measurement;
pub mod metrics;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{Camera, CaptureConfig, Frame, MockCamera};
pub use config::FileConfig;
pub use measurement::{DisplayUnit, HistoryBuffer, HistoryEntry, Measurement};
pub use session::{Command, Session, SessionHandle, SessionSettings, SessionSnapshot, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
