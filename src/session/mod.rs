//! Detection session lifecycle.
//!
//! ```text
//! Idle ──start──▶ Starting ──camera ok──▶ Streaming ──stop──▶ Stopped
//!                    │                        │
//!               camera failed        detector error / connection lost
//!                    ▼                        ▼
//!                  Error ◀────────────────────┘   (start again to retry)
//! ```
//!
//! [`SessionMachine`] decides transitions and [`Session`] carries out the
//! resulting effects on the camera, the detector channel and the
//! sampling timer.

mod driver;
mod machine;
mod state;

pub use driver::{Command, Session, SessionHandle, SessionSettings};
pub use machine::{Effect, Event, SessionMachine, CONNECTION_LOST};
pub use state::{AnnotatedFrame, SessionSnapshot, SessionState, SessionStats};
