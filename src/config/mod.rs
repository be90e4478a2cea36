//! Configuration and serialization module.
//!
//! Every tunable of the pipeline lives here with its default. Files are read
//! as JSON when the extension is `.json` and as XML otherwise; missing fields
//! fall back to the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid XML config: {0}")]
    Xml(#[from] quick_xml::de::DeError),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratorConfig {
    pub session: SessionConfig,
    pub board: BoardConfig,
    pub recognition: RecognitionConfig,
    pub acceptance: AcceptanceConfig,
    pub screen: ScreenConfig,
}

impl CalibratorConfig {
    /// Load from a `.json` or XML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&contents)?
        } else {
            quick_xml::de::from_str(&contents)?
        };

        config.validate()?;
        log::info!("Loaded calibrator config from {}", path.display());
        Ok(config)
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.acceptance;
        if !(a.brightness_dark < a.brightness_bright) {
            return Err(ConfigError::Invalid(format!(
                "brightness_dark ({}) must be below brightness_bright ({})",
                a.brightness_dark, a.brightness_bright
            )));
        }
        if a.brightness_step <= 0.0 {
            return Err(ConfigError::Invalid("brightness_step must be positive".into()));
        }
        let b = &self.board;
        if b.width <= 2.0 * b.marker_size || b.height <= 2.0 * b.marker_size {
            return Err(ConfigError::Invalid(
                "board must be larger than two markers in each direction".into(),
            ));
        }
        if self.session.default_interval_ms == 0 || self.session.fast_interval_ms == 0 {
            return Err(ConfigError::Invalid("delivery intervals must be non-zero".into()));
        }
        Ok(())
    }
}

/// Frame delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delivery interval outside active calibration.
    pub default_interval_ms: u64,
    /// Delivery interval while calibrating.
    pub fast_interval_ms: u64,
    /// Physical camera to open, if any.
    pub camera_index: Option<u32>,
    /// How long `start()` waits for the device to open.
    pub open_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 500,
            fast_interval_ms: 100,
            camera_index: None,
            open_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Physical board layout, in board cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub width: f64,
    pub height: f64,
    /// Side of the square corner fiducials.
    pub marker_size: f64,
    /// Length of the orientation bar along the top edge.
    pub orientation_bar_length: f64,
    /// Thickness of the orientation bar.
    pub orientation_bar_thickness: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: 30.0,
            height: 20.0,
            marker_size: 2.0,
            orientation_bar_length: 6.0,
            orientation_bar_thickness: 1.0,
        }
    }
}

/// Recognition thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Pixels darker than `mean * ratio` count as marker ink.
    pub dark_threshold_ratio: f32,
    /// Smallest connected component considered a marker, in pixels.
    pub min_marker_area: usize,
    /// Largest marker as a fraction of the frame area.
    pub max_marker_area_fraction: f64,
    /// Bounding boxes outside `[1/r, r]` width:height are not markers at all.
    pub max_marker_elongation: f64,
    /// Markers less square than this (short side / long side) are incomplete.
    pub min_marker_squareness: f64,
    /// Markers filling less of their bounding box than this are incomplete.
    pub min_marker_fill: f64,
    /// Allowed relative deviation of the candidate aspect ratio.
    pub aspect_tolerance: f64,
    /// Samples per axis when verifying the board interior.
    pub pattern_samples: usize,
    /// Fraction of samples that must agree with the expected pattern.
    pub pattern_min_agreement: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            dark_threshold_ratio: 0.5,
            min_marker_area: 12,
            max_marker_area_fraction: 0.02,
            max_marker_elongation: 3.0,
            min_marker_squareness: 0.7,
            min_marker_fill: 0.75,
            aspect_tolerance: 0.35,
            pattern_samples: 8,
            pattern_min_agreement: 0.8,
        }
    }
}

/// Acceptance window and brightness feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceConfig {
    /// Continuous stable recognition required before accepting.
    pub acceptance_interval_ms: u64,
    /// Max per-corner movement between consecutive candidates, in pixels.
    pub stability_tolerance: f64,
    /// Brightness change per failed frame.
    pub brightness_step: f32,
    pub brightness_dark: f32,
    pub brightness_bright: f32,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            acceptance_interval_ms: 1000,
            stability_tolerance: 8.0,
            brightness_step: 0.001,
            brightness_dark: 0.4,
            brightness_bright: 1.0,
        }
    }
}

impl AcceptanceConfig {
    pub fn acceptance_interval(&self) -> Duration {
        Duration::from_millis(self.acceptance_interval_ms)
    }
}

/// On-screen area the board is drawn into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: f64,
    pub height: f64,
    /// Border around the board, as a fraction of the smaller screen side.
    pub border_fraction: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
            border_fraction: 0.05,
        }
    }
}
