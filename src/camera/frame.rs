//! Frames handed from the session to its consumer.

use std::sync::Arc;
use std::time::Instant;

use image::{GrayImage, RgbaImage};

/// Where a frame's pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// A physical capture device.
    Camera,
    /// Substitute image supplied by the consumer.
    Simulated,
}

/// Image plus capture time. Immutable once delivered; clones share pixels.
#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    timestamp: Instant,
    frame_number: u64,
    source: FrameSource,
}

impl Frame {
    pub fn new(image: RgbaImage, timestamp: Instant, frame_number: u64, source: FrameSource) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
            frame_number,
            source,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn source(&self) -> FrameSource {
        self.source
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Luma copy for recognition.
    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(self.image.as_ref())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("frame_number", &self.frame_number)
            .field("source", &self.source)
            .finish()
    }
}
