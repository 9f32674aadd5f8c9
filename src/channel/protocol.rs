//! JSON messages exchanged with the detector.
//!
//! Outbound: `{"image": "<base64 jpeg>"}`.
//! Inbound: `{"distance": f64, "image"?: "<base64>", "faceDetected"?: bool}`,
//! `{"error": "<message>"}` or `{"calibrationStatus": "<message>"}`.

use crate::measurement::Measurement;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for inbound payloads that cannot be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or a known field has the wrong type.
    #[error("payload is not a valid detector message: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON without any field the client understands.
    #[error("payload has no error, distance or status field")]
    Unrecognized,
}

/// One sampled frame sent to the detector.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMessage<'a> {
    /// Base64 JPEG without a data-URL prefix.
    pub image: &'a str,
}

impl FrameMessage<'_> {
    /// Serializes the message for a text frame.
    pub fn to_json(&self) -> String {
        // A struct with a single string field always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    error: Option<String>,
    distance: Option<f64>,
    image: Option<String>,
    face_detected: Option<bool>,
    calibration_status: Option<String>,
}

/// A decoded detector message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A distance reading, possibly the negative "no face" sentinel.
    Reading {
        measurement: Measurement,
        face_detected: Option<bool>,
    },
    /// The detector rejected or failed to process a frame.
    Error(String),
    /// Informational status such as calibration progress.
    Status(String),
}

/// Parses one inbound text message.
///
/// A non-empty `error` takes precedence over everything else, then
/// `distance`, then `calibrationStatus`.
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let raw: RawInbound = serde_json::from_str(text)?;

    if let Some(error) = raw.error.filter(|e| !e.is_empty()) {
        return Ok(Inbound::Error(error));
    }
    if let Some(distance) = raw.distance {
        return Ok(Inbound::Reading {
            measurement: Measurement {
                distance_meters: distance,
                annotated_image: raw.image.filter(|i| !i.is_empty()),
            },
            face_detected: raw.face_detected,
        });
    }
    if let Some(status) = raw.calibration_status {
        return Ok(Inbound::Status(status));
    }
    Err(ProtocolError::Unrecognized)
}
