//! File and environment configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file,
//! then command-line flags (and `DETECTOR_WS_URL`) applied by the binary.

use crate::capture::CaptureConfig;
use crate::measurement::DisplayUnit;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Detector endpoint used when nothing else is configured.
pub const DEFAULT_DETECTOR_URL: &str = "ws://localhost:8000/ws";

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Detector URL is not a WebSocket URL.
    #[error("invalid detector url {0:?} (expected ws:// or wss://)")]
    InvalidUrl(String),
    /// Sampling interval of zero.
    #[error("sample interval must be at least 1 ms")]
    InvalidInterval,
    /// JPEG quality outside 1-100.
    #[error("invalid jpeg quality {0} (must be 1-100)")]
    InvalidQuality(u8),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Remote detector and frame sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// WebSocket endpoint of the detector.
    pub url: String,
    /// Milliseconds between sampling ticks.
    pub sample_interval_ms: u64,
    /// JPEG quality for outbound frames (1-100).
    pub jpeg_quality: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DETECTOR_URL.to_string(),
            sample_interval_ms: 100,
            jpeg_quality: 70,
        }
    }
}

impl DetectorConfig {
    /// Sampling period as a `Duration`.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Checks the URL scheme, interval and quality.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

/// Presentation defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Unit shown at startup.
    pub unit: DisplayUnit,
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

/// Full configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// `[capture]` table.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[detector]` table.
    #[serde(default)]
    pub detector: DetectorConfig,
    /// `[display]` table.
    #[serde(default)]
    pub display: DisplayConfig,
    /// `[metrics]` table.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.detector.validate()
    }
}
