//! Hardware camera backed by `nokhwa`.

use super::{Camera, CameraError, CaptureConfig, Frame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};

/// A local video device opened through the platform backend.
///
/// The backend handle is not `Send` on every platform, so construct it
/// on the thread that will use it.
#[derive(Default)]
pub struct NokhwaCamera {
    device: Option<nokhwa::Camera>,
    sequence: u64,
}

impl NokhwaCamera {
    /// A closed camera; the device is chosen by `CaptureConfig::device_id`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Camera for NokhwaCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.close();

        // The requested size is a preference; the closest supported mode wins.
        let ideal = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(ideal));

        let mut device = nokhwa::Camera::new(CameraIndex::Index(config.device_id), requested)
            .map_err(|e| CameraError::from_open_failure(e.to_string()))?;
        device
            .open_stream()
            .map_err(|e| CameraError::from_open_failure(e.to_string()))?;

        let resolution = device.resolution();
        tracing::info!(
            device = config.device_id,
            width = resolution.width(),
            height = resolution.height(),
            "Camera stream opened"
        );

        self.device = Some(device);
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let device = self.device.as_mut().ok_or(CameraError::NotInitialized)?;
        let buffer = device
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        let (width, height) = image.dimensions();
        Ok(Frame::new(image.into_raw(), width, height, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_stream() {
                tracing::warn!(error = %e, "Failed to stop camera stream cleanly");
            }
            tracing::info!("Camera stream closed");
        }
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.close();
    }
}
