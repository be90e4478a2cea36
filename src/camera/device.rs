//! Capture device abstraction.
//!
//! Devices are opened on the delivery thread and never leave it, so
//! [`CaptureDevice`] does not need to be `Send` (camera handles on several
//! platforms are not). Only the [`CaptureSource`] that opens them crosses
//! threads.

use image::RgbaImage;
use thiserror::Error;

/// Errors from opening or reading a capture device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("No capture device available")]
    Unavailable,
    #[error("Failed to open capture device: {0}")]
    Open(String),
    #[error("Failed to capture frame: {0}")]
    Capture(String),
}

/// An opened device. Dropping it releases the hardware.
pub trait CaptureDevice {
    /// Block until the next frame is available.
    fn capture(&mut self) -> Result<RgbaImage, CaptureError>;

    /// Human-readable device name, for logs.
    fn name(&self) -> String {
        "capture device".to_string()
    }
}

/// Opens a [`CaptureDevice`]; called once per session start.
pub trait CaptureSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}
