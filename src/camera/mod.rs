//! Camera input: frame acquisition, throttling, and pause/resume.
//!
//! A [`FrameSession`] owns the capture device (or runs without one) and
//! delivers frames to a single [`FrameConsumer`] on a background thread.

mod device;
mod frame;
#[cfg(feature = "camera")]
mod nokhwa_source;
mod session;

pub use device::{CaptureDevice, CaptureError, CaptureSource};
pub use frame::{Frame, FrameSource};
#[cfg(feature = "camera")]
pub use nokhwa_source::{list_cameras, CameraInfo, NokhwaSource};
pub use session::{DeliveryInterval, FrameConsumer, FrameSession, SessionControl};
