//! Physical camera capture through nokhwa.

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::device::{CaptureDevice, CaptureError, CaptureSource};

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(camera_list) => camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Opens camera `index` with the best format it accepts.
pub struct NokhwaSource {
    index: u32,
}

impl NokhwaSource {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CaptureSource for NokhwaSource {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let index = CameraIndex::Index(self.index);

        // Highest resolution first, then a VGA request, then whatever the
        // driver offers.
        let attempts = [
            RequestedFormatType::AbsoluteHighestResolution,
            RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
            RequestedFormatType::None,
        ];

        let mut last_error = String::new();
        for format in attempts {
            let requested = RequestedFormat::new::<RgbAFormat>(format.clone());
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => {
                    camera
                        .open_stream()
                        .map_err(|e| CaptureError::Open(format!("{:?}", e)))?;
                    log::info!(
                        "Camera opened: {} ({}x{})",
                        camera.info().human_name(),
                        camera.resolution().width(),
                        camera.resolution().height()
                    );
                    return Ok(Box::new(NokhwaDevice { camera }));
                }
                Err(e) => {
                    log::warn!("Camera {} rejected format {:?}: {:?}", self.index, format, e);
                    last_error = format!("{:?}", e);
                }
            }
        }

        Err(CaptureError::Open(last_error))
    }
}

struct NokhwaDevice {
    camera: Camera,
}

impl CaptureDevice for NokhwaDevice {
    fn capture(&mut self) -> Result<RgbaImage, CaptureError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Capture(format!("{:?}", e)))?;
        buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| CaptureError::Capture(format!("{:?}", e)))
    }

    fn name(&self) -> String {
        self.camera.info().human_name().to_string()
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
    }
}
