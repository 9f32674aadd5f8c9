//! Camera input and frame handling.
//!
//! The session owns exactly one [`Camera`]. Opening it starts the live
//! stream; closing it stops every track the device handed out. The
//! camera runs on its own thread behind a [`CameraActor`].

mod actor;
mod camera;
mod config;
#[cfg(feature = "camera")]
mod device;
mod frame;

pub use actor::{spawn_camera_actor, CameraActor, CameraCommand, CameraEvent, RequestId};
pub use camera::{Camera, CameraError, MockCamera};
pub use config::CaptureConfig;
#[cfg(feature = "camera")]
pub use device::NokhwaCamera;
pub use frame::{Frame, RGB_CHANNELS};
