//! Four-corner quadrilateral with a canonical, rotation-independent order.

use super::Point;

/// Corner slot of a canonically ordered [`Quad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft = 0,
    TopRight = 1,
    BottomRight = 2,
    BottomLeft = 3,
}

/// Four points, clockwise from the top-left corner (image coordinates, y down).
///
/// The array length is the invariant: a quad can never carry fewer than four
/// corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    points: [Point; 4],
}

impl Quad {
    /// Wrap four points that are already in canonical order.
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Sort four arbitrary points into canonical order.
    ///
    /// Points are sorted by angle around their centroid, which in a y-down frame
    /// yields clockwise order, then rotated so the corner closest to the
    /// top-left of the frame (smallest `x + y`) comes first.
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;

        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let ta = (a.y - cy).atan2(a.x - cx);
            let tb = (b.y - cy).atan2(b.x - cx);
            ta.total_cmp(&tb)
        });

        let start = sorted
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        sorted.rotate_left(start);

        Self { points: sorted }
    }

    /// Axis-aligned rectangle, canonical order.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new([
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    pub fn corner(&self, corner: Corner) -> Point {
        self.points[corner as usize]
    }

    /// Same corners, relabelled so that the corner at `offset` becomes top-left.
    pub fn rotated(&self, offset: usize) -> Self {
        let mut points = self.points;
        points.rotate_left(offset % 4);
        Self { points }
    }

    pub fn centroid(&self) -> Point {
        let x = self.points.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let y = self.points.iter().map(|p| p.y).sum::<f64>() / 4.0;
        Point::new(x, y)
    }

    /// Signed area via the shoelace formula. Positive for clockwise order in a
    /// y-down frame.
    pub fn signed_area(&self) -> f64 {
        let mut sum = 0.0;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    /// Strictly convex: every turn has the same, non-zero orientation.
    pub fn is_convex(&self) -> bool {
        let mut sign = 0.0_f64;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            let c = self.points[(i + 2) % 4];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if cross.abs() < 1e-9 {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Mean horizontal edge length over mean vertical edge length.
    pub fn aspect_ratio(&self) -> f64 {
        let [tl, tr, br, bl] = self.points;
        let width = ((tr - tl).norm() + (br - bl).norm()) / 2.0;
        let height = ((bl - tl).norm() + (br - tr).norm()) / 2.0;
        if height <= f64::EPSILON {
            return f64::INFINITY;
        }
        width / height
    }

    /// Largest distance between corresponding corners of two quads.
    pub fn max_corner_distance(&self, other: &Quad) -> f64 {
        self.points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }
}
