//! Board calibration: stability acceptance, brightness feedback and the
//! published camera-to-screen transform.

mod calibrator;
mod publisher;
mod service;
mod state;

pub use calibrator::BoardCalibrator;
pub use publisher::{PublishedCalibration, TransformPublisher};
pub use service::{CalibrationHandle, CalibrationService, CalibrationSnapshot};
pub use state::{BrightnessDirection, BrightnessHint, CalibrationState, StateTransition};

use thiserror::Error;

/// Errors from the calibration accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("No transform available, calibrator is {0}")]
    NotCalibrated(CalibrationState),
}
