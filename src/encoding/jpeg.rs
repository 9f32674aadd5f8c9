//! JPEG + base64 frame encoding.

use crate::capture::Frame;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType};
use thiserror::Error;

/// Quality used when none is configured (0.7 on a 0-1 scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Errors that can occur while encoding or decoding frame payloads.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The pixel buffer does not match the frame's dimensions.
    #[error("frame buffer does not match {width}x{height} RGB8")]
    InvalidFrame {
        /// Claimed width.
        width: u32,
        /// Claimed height.
        height: u32,
    },
    /// The JPEG encoder rejected the frame.
    #[error("jpeg encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
    /// A received payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Turns captured frames into the detector's image payload.
///
/// The payload is plain standard base64 of the JPEG bytes, with no
/// `data:` URL prefix.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// Creates an encoder; quality is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Effective JPEG quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encodes the frame at its native size as JPEG bytes.
    pub fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        if !frame.is_valid() {
            return Err(EncodeError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let mut buffer = Vec::with_capacity(frame.expected_len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality).encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(buffer)
    }

    /// Encodes the frame and returns the base64 payload.
    pub fn encode(&self, frame: &Frame) -> Result<String, EncodeError> {
        let jpeg = self.encode_jpeg(frame)?;
        Ok(STANDARD.encode(jpeg))
    }
}

/// Decodes a base64 image payload, tolerating a `data:...;base64,` prefix.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, EncodeError> {
    let body = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    Ok(STANDARD.decode(body.trim())?)
}
