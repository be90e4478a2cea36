//! Planar geometry: quadrilaterals in canonical corner order and the
//! projective transform between two of them.

mod homography;
mod quad;

pub use homography::{Transform, TransformError};
pub use quad::{Corner, Quad};

/// 2D point in pixel (or board-unit) coordinates.
pub type Point = nalgebra::Point2<f64>;
