//! Camera abstraction for frame capture.
//!
//! The session only talks to the [`Camera`] trait, so a synthetic
//! camera can stand in for real hardware in tests and demos.

use super::{frame::RGB_CHANNELS, CaptureConfig, Frame};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device at the requested index.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The platform or the user refused access to the device.
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    /// Any other failure while starting the stream.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The capture settings were rejected before touching the device.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// The stream was open but no frame could be read.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// Capture was requested before a successful open.
    #[error("camera not initialized")]
    NotInitialized,
    /// The camera thread is no longer running.
    #[error("camera thread stopped")]
    ThreadStopped,
}

impl CameraError {
    /// Sorts a platform open failure by its message.
    ///
    /// Backends report refused access and missing devices only as text
    /// (`Permission denied (os error 13)`, `No such file or directory`).
    pub fn from_open_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if ["permission", "denied", "not authorized"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::PermissionDenied(message)
        } else if ["no such", "not found", "does not exist"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::DeviceNotFound(message)
        } else {
            Self::OpenFailed(message)
        }
    }
}

/// Trait for camera implementations.
///
/// An open camera corresponds to a live capture stream. `close` stops
/// the stream and must be safe to call on a closed camera. Both `open`
/// and `capture` may block, so the session drives cameras from a
/// dedicated thread (see [`super::spawn_camera_actor`]).
pub trait Camera {
    /// Opens the device and starts streaming.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Grabs the current frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Stops streaming and releases the device.
    fn close(&mut self);
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        (**self).open(config)
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        (**self).capture()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Debug, Default)]
struct MockDevice {
    config: Option<CaptureConfig>,
    sequence: u64,
    opens: u64,
}

/// Synthetic camera producing a moving gradient.
///
/// Clones share one simulated device, so a clone kept aside observes
/// the camera after the original has been handed to a session.
#[derive(Debug, Clone, Default)]
pub struct MockCamera {
    device: Arc<Mutex<MockDevice>>,
    deny_reason: Option<String>,
    open_delay: Duration,
}

impl MockCamera {
    /// A camera that opens immediately at any valid size.
    pub fn new() -> Self {
        Self::default()
    }

    /// A camera whose every open attempt is refused with `reason`.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            deny_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Makes every open block for `delay`, like a device waiting on a
    /// permission prompt.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> u64 {
        self.device().opens
    }

    fn device(&self) -> MutexGuard<'_, MockDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        if let Some(reason) = &self.deny_reason {
            return Err(CameraError::PermissionDenied(reason.clone()));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let mut device = self.device();
        device.config = Some(config.clone());
        device.sequence = 0;
        device.opens += 1;
        tracing::info!(
            width = config.width,
            height = config.height,
            "MockCamera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let mut device = self.device();
        let (width, height) = match device.config.as_ref() {
            Some(config) => (config.width, config.height),
            None => return Err(CameraError::NotInitialized),
        };

        let shift = device.sequence as usize;
        let (w, h) = (width as usize, height as usize);
        let mut pixels = Vec::with_capacity(w * h * RGB_CHANNELS);
        for y in 0..h {
            for x in 0..w {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift) % 256) as u8);
                pixels.push(((x ^ y) % 256) as u8);
            }
        }

        device.sequence += 1;
        Ok(Frame::new(pixels, width, height, device.sequence))
    }

    fn is_open(&self) -> bool {
        self.device().config.is_some()
    }

    fn close(&mut self) {
        if self.device().config.take().is_some() {
            tracing::info!("MockCamera closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new();
        let config = CaptureConfig::with_dimensions(32, 24);

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);

        camera.close();
        camera.close();
        assert!(!camera.is_open());
        assert_eq!(camera.open_count(), 1);
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(camera.capture(), Err(CameraError::NotInitialized)));
    }

    #[test]
    fn test_denied_camera_stays_closed() {
        let mut camera = MockCamera::denied("Permission denied");
        let err = camera.open(&CaptureConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "camera access denied: Permission denied");
        assert!(!camera.is_open());
    }

    #[test]
    fn test_boxed_camera_delegates() {
        let mut camera: Box<dyn Camera> = Box::new(MockCamera::new());
        camera.open(&CaptureConfig::with_dimensions(8, 8)).unwrap();
        assert!(camera.is_open());
        assert_eq!(camera.capture().unwrap().width(), 8);
        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_clones_share_the_device() {
        let observer = MockCamera::new();
        let mut camera = observer.clone();
        camera.open(&CaptureConfig::with_dimensions(8, 8)).unwrap();
        assert!(observer.is_open());
        assert_eq!(observer.open_count(), 1);

        camera.close();
        assert!(!observer.is_open());
    }

    #[test]
    fn test_open_failures_are_classified() {
        assert!(matches!(
            CameraError::from_open_failure(
                "Could not open device 0: Permission denied (os error 13)"
            ),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            CameraError::from_open_failure("Could not open device 3: No such file or directory"),
            CameraError::DeviceNotFound(_)
        ));
        let busy = CameraError::from_open_failure("Device or resource busy");
        assert_eq!(
            busy.to_string(),
            "failed to open camera: Device or resource busy"
        );
    }
}
