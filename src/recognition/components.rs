//! Connected components of dark pixels.

use image::{GrayImage, Luma};
use imageproc::contrast::{threshold as threshold_image, ThresholdType};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::geometry::Point;

/// A 4-connected region of pixels below the dark threshold, with its
/// first and second moments.
#[derive(Debug, Clone)]
pub struct Blob {
    pub area: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub touches_border: bool,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_yy: f64,
    sum_xy: f64,
}

impl Blob {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            touches_border: false,
            sum_x: 0.0,
            sum_y: 0.0,
            sum_xx: 0.0,
            sum_yy: 0.0,
            sum_xy: 0.0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        let (fx, fy) = (x as f64, y as f64);
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += fx;
        self.sum_y += fy;
        self.sum_xx += fx * fx;
        self.sum_yy += fy * fy;
        self.sum_xy += fx * fy;
    }

    /// Centroid at pixel centres.
    pub fn centroid(&self) -> Point {
        let n = self.area as f64;
        Point::new(self.sum_x / n + 0.5, self.sum_y / n + 0.5)
    }

    /// Eigenvalues of the covariance matrix, largest first.
    fn principal_variances(&self) -> (f64, f64) {
        let n = self.area as f64;
        let mx = self.sum_x / n;
        let my = self.sum_y / n;
        // Each pixel is a unit square, not a point: add its own 1/12 variance.
        let cxx = self.sum_xx / n - mx * mx + 1.0 / 12.0;
        let cyy = self.sum_yy / n - my * my + 1.0 / 12.0;
        let cxy = self.sum_xy / n - mx * my;

        let mean = (cxx + cyy) / 2.0;
        let diff = (((cxx - cyy) / 2.0).powi(2) + cxy * cxy).sqrt();
        (mean + diff, (mean - diff).max(0.0))
    }

    /// Minor over major axis length; 1.0 for a square at any rotation.
    pub fn squareness(&self) -> f64 {
        let (major, minor) = self.principal_variances();
        if major <= f64::EPSILON {
            return 0.0;
        }
        (minor / major).sqrt()
    }

    /// Area relative to a solid rectangle with the same second moments.
    /// Close to 1.0 for solid rectangles, lower for ragged or hollow shapes.
    pub fn fill_ratio(&self) -> f64 {
        let (major, minor) = self.principal_variances();
        let expected = 12.0 * (major * minor).sqrt();
        if expected <= f64::EPSILON {
            return 0.0;
        }
        self.area as f64 / expected
    }
}

/// Label 4-connected regions of pixels strictly darker than `threshold`,
/// keeping those with at least `min_area` pixels.
pub fn dark_components(luma: &GrayImage, threshold: u8, min_area: usize) -> Vec<Blob> {
    if threshold == 0 {
        return Vec::new();
    }
    let (width, height) = luma.dimensions();

    // Dark pixels become foreground (255), everything else background.
    let binary = threshold_image(luma, threshold - 1, ThresholdType::BinaryInverted);
    let labels = connected_components(&binary, Connectivity::Four, Luma([0u8]));

    let mut blobs: Vec<Option<Blob>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if blobs.len() < label {
            blobs.resize(label, None);
        }
        let blob = blobs[label - 1].get_or_insert_with(|| Blob::new(x, y));
        blob.add(x, y);
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            blob.touches_border = true;
        }
    }

    blobs
        .into_iter()
        .flatten()
        .filter(|b| b.area >= min_area)
        .collect()
}
