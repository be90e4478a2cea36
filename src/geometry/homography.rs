//! Planar homography between two quadrilaterals.
//!
//! The camera-to-screen mapping is solved from exactly four correspondences,
//! so a direct 8x8 linear solve is used instead of a RANSAC fit. Points are
//! Hartley-normalized first to keep the system well conditioned for
//! pixel-scale coordinates.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use thiserror::Error;

use super::{Point, Quad};

/// Errors from solving or inverting a transform.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Quadrilateral is degenerate, cannot solve homography")]
    Degenerate,
    #[error("Matrix is singular, cannot invert")]
    Singular,
}

/// 3x3 projective transform, normalized so that `h[2][2] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }
}

impl Transform {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Solve `dst ~ H * src` from the four corner correspondences.
    ///
    /// Corner order must match between `src` and `dst`; both come out of
    /// [`Quad`] in canonical order.
    pub fn from_quads(src: &Quad, dst: &Quad) -> Result<Self, TransformError> {
        let (src_n, t_src) = normalize_points(src.points())?;
        let (dst_n, t_dst) = normalize_points(dst.points())?;

        // Unknowns h11..h32 with h33 = 1:
        // h11 x + h12 y + h13 - u h31 x - u h32 y = u
        // h21 x + h22 y + h23 - v h31 x - v h32 y = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for k in 0..4 {
            let (x, y) = (src_n[k].x, src_n[k].y);
            let (u, v) = (dst_n[k].x, dst_n[k].y);

            let r0 = 2 * k;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -u * x;
            a[(r0, 7)] = -u * y;
            b[r0] = u;

            let r1 = 2 * k + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -v * x;
            a[(r1, 7)] = -v * y;
            b[r1] = v;
        }

        let x = a.lu().solve(&b).ok_or(TransformError::Degenerate)?;

        let hn = Matrix3::new(
            x[0], x[1], x[2], //
            x[3], x[4], x[5], //
            x[6], x[7], 1.0,
        );

        let t_dst_inv = t_dst.try_inverse().ok_or(TransformError::Degenerate)?;
        let h = t_dst_inv * hn * t_src;
        let s = h[(2, 2)];
        if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
            return Err(TransformError::Degenerate);
        }

        Ok(Self { matrix: h / s })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Row-major 3x3 array, for consumers that do not use nalgebra.
    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a point. Returns `None` for points on the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-10 {
            return None;
        }
        Some(Point::new(v[0] / w, v[1] / w))
    }

    /// Map every corner of a quad; `None` if any corner maps to infinity.
    pub fn apply_quad(&self, quad: &Quad) -> Option<Quad> {
        let [a, b, c, d] = *quad.points();
        Some(Quad::new([
            self.apply(a)?,
            self.apply(b)?,
            self.apply(c)?,
            self.apply(d)?,
        ]))
    }

    pub fn inverse(&self) -> Result<Self, TransformError> {
        let inv = self.matrix.try_inverse().ok_or(TransformError::Singular)?;
        let s = inv[(2, 2)];
        if s.abs() < 1e-12 {
            return Ok(Self { matrix: inv });
        }
        Ok(Self { matrix: inv / s })
    }
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point; 4]) -> Result<([Point; 4], Matrix3<f64>), TransformError> {
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    if !(mean_dist > 1e-12) {
        return Err(TransformError::Degenerate);
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let mut out = [Point::origin(); 4];
    for (o, p) in out.iter_mut().zip(pts.iter()) {
        let v = t * Vector3::new(p.x, p.y, 1.0);
        *o = Point::new(v[0], v[1]);
    }
    Ok((out, t))
}
