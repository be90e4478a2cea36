//! Board layout in board cells and its placement on screen.
//!
//! Board space has its origin at the outer top-left corner of the physical
//! board, one unit per cell. The corner fiducials are `marker_size` squares
//! flush with each outer corner; the orientation bar sits centred in the top
//! marker row.

use crate::config::{BoardConfig, ScreenConfig};
use crate::geometry::{Point, Quad, Transform};

/// Edge of the board carrying the orientation bar, as seen in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarEdge {
    Top,
    Bottom,
}

/// Physical board geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayout {
    pub width: f64,
    pub height: f64,
    pub marker_size: f64,
    pub bar_length: f64,
    pub bar_thickness: f64,
}

impl BoardLayout {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            marker_size: config.marker_size,
            bar_length: config.orientation_bar_length,
            bar_thickness: config.orientation_bar_thickness,
        }
    }

    pub fn outline(&self) -> Quad {
        Quad::from_rect(0.0, 0.0, self.width, self.height)
    }

    /// Marker centres in board space, canonical order. This is the quad the
    /// boundary stage reports in camera space.
    pub fn marker_centers(&self) -> Quad {
        let h = self.marker_size / 2.0;
        Quad::new([
            Point::new(h, h),
            Point::new(self.width - h, h),
            Point::new(self.width - h, self.height - h),
            Point::new(h, self.height - h),
        ])
    }

    /// Expected aspect ratio of [`marker_centers`](Self::marker_centers).
    pub fn marker_aspect(&self) -> f64 {
        (self.width - self.marker_size) / (self.height - self.marker_size)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width && p.y < self.height
    }

    pub fn is_marker(&self, p: Point) -> bool {
        let m = self.marker_size;
        let near_x = p.x < m || p.x >= self.width - m;
        let near_y = p.y < m || p.y >= self.height - m;
        self.contains(p) && near_x && near_y
    }

    pub fn is_orientation_bar(&self, p: Point) -> bool {
        let cy = self.marker_size / 2.0;
        (p.x - self.width / 2.0).abs() <= self.bar_length / 2.0
            && (p.y - cy).abs() <= self.bar_thickness / 2.0
    }

    /// Points along the centre line of the bar position on `edge`.
    pub fn bar_samples(&self, edge: BarEdge, count: usize) -> Vec<Point> {
        let y = match edge {
            BarEdge::Top => self.marker_size / 2.0,
            BarEdge::Bottom => self.height - self.marker_size / 2.0,
        };
        let half = self.bar_length / 2.0 * 0.8;
        let x0 = self.width / 2.0 - half;
        let count = count.max(2);
        (0..count)
            .map(|i| Point::new(x0 + 2.0 * half * i as f64 / (count - 1) as f64, y))
            .collect()
    }

    /// Regular grid over the playing area inside the marker rows.
    pub fn interior_samples(&self, per_axis: usize) -> Vec<Point> {
        let inset = self.marker_size + 0.5;
        let w = self.width - 2.0 * inset;
        let h = self.height - 2.0 * inset;
        let n = per_axis.max(2);
        let mut samples = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                samples.push(Point::new(
                    inset + w * i as f64 / (n - 1) as f64,
                    inset + h * j as f64 / (n - 1) as f64,
                ));
            }
        }
        samples
    }
}

/// Where the board is drawn on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenLayout {
    board: BoardLayout,
    origin: Point,
    scale: f64,
}

impl ScreenLayout {
    /// Fit the board, aspect preserved, into the screen minus its border.
    pub fn new(board: BoardLayout, screen: &ScreenConfig) -> Self {
        let border = screen.width.min(screen.height) * screen.border_fraction;
        let avail_w = (screen.width - 2.0 * border).max(1.0);
        let avail_h = (screen.height - 2.0 * border).max(1.0);
        let scale = (avail_w / board.width).min(avail_h / board.height);
        let origin = Point::new(
            border + (avail_w - board.width * scale) / 2.0,
            border + (avail_h - board.height * scale) / 2.0,
        );
        Self {
            board,
            origin,
            scale,
        }
    }

    pub fn board(&self) -> &BoardLayout {
        &self.board
    }

    /// Screen size of one board cell.
    pub fn cell_size(&self) -> f64 {
        self.scale
    }

    pub fn board_to_screen(&self, p: Point) -> Point {
        Point::new(self.origin.x + p.x * self.scale, self.origin.y + p.y * self.scale)
    }

    pub fn screen_to_board(&self, p: Point) -> Point {
        Point::new((p.x - self.origin.x) / self.scale, (p.y - self.origin.y) / self.scale)
    }

    /// Screen positions of the marker centres; the fixed target quad of the
    /// camera-to-screen transform.
    pub fn reference_quad(&self) -> Quad {
        let [a, b, c, d] = *self.board.marker_centers().points();
        Quad::new([
            self.board_to_screen(a),
            self.board_to_screen(b),
            self.board_to_screen(c),
            self.board_to_screen(d),
        ])
    }

    /// Screen position of the centre of cell `(col, row)`.
    pub fn cell_screen_position(&self, col: u32, row: u32) -> Point {
        self.board_to_screen(Point::new(col as f64 + 0.5, row as f64 + 0.5))
    }

    /// Board cell under a camera-space point, through a published transform.
    pub fn camera_to_cell(&self, transform: &Transform, camera: Point) -> Option<(u32, u32)> {
        let screen = transform.apply(camera)?;
        let board = self.screen_to_board(screen);
        if !self.board.contains(board) {
            return None;
        }
        Some((board.x.floor() as u32, board.y.floor() as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> ScreenLayout {
        ScreenLayout::new(
            BoardLayout::new(&BoardConfig::default()),
            &ScreenConfig::default(),
        )
    }

    #[test]
    fn test_marker_geometry() {
        let board = BoardLayout::new(&BoardConfig::default());
        assert_relative_eq!(board.marker_aspect(), 28.0 / 18.0);
        assert!(board.is_marker(Point::new(0.5, 0.5)));
        assert!(board.is_marker(Point::new(29.5, 19.5)));
        assert!(!board.is_marker(Point::new(15.0, 0.5)));
        assert!(board.is_orientation_bar(Point::new(15.0, 1.0)));
        assert!(!board.is_orientation_bar(Point::new(15.0, 19.0)));
    }

    #[test]
    fn test_board_fits_inside_screen_border() {
        let layout = layout();
        let outline = layout.board().outline();
        for p in outline.points() {
            let s = layout.board_to_screen(*p);
            assert!(s.x >= 38.4 - 1e-9 && s.x <= 1024.0 - 38.4 + 1e-9);
            assert!(s.y >= 38.4 - 1e-9 && s.y <= 768.0 - 38.4 + 1e-9);
        }
        // Width-limited: 30 cells span the available width exactly.
        assert_relative_eq!(layout.cell_size() * 30.0, 1024.0 - 2.0 * 38.4, epsilon = 1e-9);
    }

    #[test]
    fn test_camera_to_cell_through_transform() {
        let layout = layout();
        // Camera sees the board 8 pixels per cell, offset by (40, 30).
        let camera_centers = {
            let [a, b, c, d] = *layout.board().marker_centers().points();
            let f = |p: Point| Point::new(40.0 + p.x * 8.0, 30.0 + p.y * 8.0);
            Quad::new([f(a), f(b), f(c), f(d)])
        };
        let t = Transform::from_quads(&camera_centers, &layout.reference_quad()).unwrap();

        assert_eq!(layout.camera_to_cell(&t, Point::new(40.0 + 12.5 * 8.0, 30.0 + 7.5 * 8.0)), Some((12, 7)));
        assert_eq!(layout.camera_to_cell(&t, Point::new(10.0, 10.0)), None);

        let center = layout.cell_screen_position(12, 7);
        let via_camera = t.apply(Point::new(40.0 + 12.5 * 8.0, 30.0 + 7.5 * 8.0)).unwrap();
        assert_relative_eq!(center.x, via_camera.x, epsilon = 1e-6);
        assert_relative_eq!(center.y, via_camera.y, epsilon = 1e-6);
    }
}
