//! Synthetic board frames for running without a camera.
//!
//! The renderer paints the board as a camera would see it: light playing
//! surface, dark corner markers and orientation bar, a mid-grey background,
//! all scaled by an exposure factor. Scenes can tilt, flip, or partially
//! cover the board to exercise each recognition outcome.

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::board::BoardLayout;
use crate::geometry::{Corner, Point, Quad, Transform};

/// Rectangle painted over the frame, e.g. a hand over a marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occlusion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub luma: u8,
}

impl Occlusion {
    fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }
}

/// What the simulated camera sees.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardScene {
    pub width: u32,
    pub height: u32,
    /// Fraction of the frame width spanned by the board.
    pub fill: f64,
    /// Board rotation about the frame centre, degrees clockwise.
    pub rotation_deg: f64,
    pub background: u8,
    pub surface: u8,
    pub ink: u8,
    /// Multiplier on every pixel, 1.0 = nominal lighting.
    pub exposure: f32,
    pub board_visible: bool,
    pub orientation_bar: bool,
    pub occlusion: Option<Occlusion>,
    occluded_marker: Option<Corner>,
}

impl Default for BoardScene {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fill: 0.75,
            rotation_deg: 0.0,
            background: 100,
            surface: 220,
            ink: 30,
            exposure: 1.0,
            board_visible: true,
            orientation_bar: true,
            occlusion: None,
            occluded_marker: None,
        }
    }
}

impl BoardScene {
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_deg = degrees;
        self
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn without_board(mut self) -> Self {
        self.board_visible = false;
        self
    }

    pub fn without_orientation_bar(mut self) -> Self {
        self.orientation_bar = false;
        self
    }

    /// Cover the upper half of one corner marker with a skin-toned patch.
    pub fn with_marker_occluded(mut self, corner: Corner) -> Self {
        self.occluded_marker = Some(corner);
        self
    }

    /// Outer board corners in image space, board-canonical order.
    pub fn board_corners(&self, layout: &BoardLayout) -> Quad {
        let scale = self.width as f64 * self.fill / layout.width;
        let (hw, hh) = (layout.width * scale / 2.0, layout.height * scale / 2.0);
        let (cx, cy) = (self.width as f64 / 2.0, self.height as f64 / 2.0);
        let (s, c) = self.rotation_deg.to_radians().sin_cos();
        let place = |x: f64, y: f64| Point::new(cx + c * x - s * y, cy + s * x + c * y);
        Quad::new([
            place(-hw, -hh),
            place(hw, -hh),
            place(hw, hh),
            place(-hw, hh),
        ])
    }
}

/// Renders [`BoardScene`]s; the scene can be swapped while a session runs.
pub struct BoardSimulator {
    layout: BoardLayout,
    scene: Mutex<BoardScene>,
}

impl BoardSimulator {
    pub fn new(layout: BoardLayout, scene: BoardScene) -> Self {
        Self {
            layout,
            scene: Mutex::new(scene),
        }
    }

    pub fn scene(&self) -> BoardScene {
        self.scene.lock().clone()
    }

    pub fn set_scene(&self, scene: BoardScene) {
        *self.scene.lock() = scene;
    }

    /// Where the board's marker centres land in the image, board-canonical
    /// order (so for a flipped board the first corner is bottom-right).
    pub fn marker_centers_in_image(&self) -> Quad {
        let scene = self.scene.lock();
        let corners = scene.board_corners(&self.layout);
        Transform::from_quads(&self.layout.outline(), &corners)
            .ok()
            .and_then(|t| t.apply_quad(&self.layout.marker_centers()))
            .unwrap_or(corners)
    }

    pub fn render(&self) -> RgbaImage {
        let scene = self.scene.lock().clone();
        let corners = scene.board_corners(&self.layout);
        let to_board = Transform::from_quads(&corners, &self.layout.outline()).ok();
        let occlusions = self.occlusions(&scene, &corners);

        RgbaImage::from_fn(scene.width, scene.height, |x, y| {
            let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let mut luma = scene.background;

            if scene.board_visible {
                if let Some(b) = to_board.as_ref().and_then(|t| t.apply(p)) {
                    if self.layout.contains(b) {
                        let ink = self.layout.is_marker(b)
                            || (scene.orientation_bar && self.layout.is_orientation_bar(b));
                        luma = if ink { scene.ink } else { scene.surface };
                    }
                }
            }

            if let Some(o) = occlusions.iter().find(|o| o.contains(p)) {
                luma = o.luma;
            }

            let v = (luma as f32 * scene.exposure).round().clamp(0.0, 255.0) as u8;
            Rgba([v, v, v, 255])
        })
    }

    fn occlusions(&self, scene: &BoardScene, corners: &Quad) -> Vec<Occlusion> {
        let mut out: Vec<Occlusion> = scene.occlusion.into_iter().collect();

        let Some(corner) = scene.occluded_marker else {
            return out;
        };
        let Ok(to_image) = Transform::from_quads(&self.layout.outline(), corners) else {
            return out;
        };

        let m = self.layout.marker_size;
        let (w, h) = (self.layout.width, self.layout.height);
        let origin = match corner {
            Corner::TopLeft => Point::new(0.0, 0.0),
            Corner::TopRight => Point::new(w - m, 0.0),
            Corner::BottomRight => Point::new(w - m, h - m),
            Corner::BottomLeft => Point::new(0.0, h - m),
        };
        let marker = Quad::from_rect(origin.x, origin.y, m, m);
        if let Some(img) = to_image.apply_quad(&marker) {
            let xs = img.points().iter().map(|p| p.x);
            let ys = img.points().iter().map(|p| p.y);
            let (x0, x1) = (xs.clone().fold(f64::MAX, f64::min), xs.fold(f64::MIN, f64::max));
            let (y0, y1) = (ys.clone().fold(f64::MAX, f64::min), ys.fold(f64::MIN, f64::max));
            out.push(Occlusion {
                x: x0 - 1.0,
                y: y0 - 1.0,
                width: x1 - x0 + 2.0,
                height: (y1 - y0) / 2.0 + 1.0,
                luma: 170,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;

    fn simulator(scene: BoardScene) -> BoardSimulator {
        BoardSimulator::new(BoardLayout::new(&BoardConfig::default()), scene)
    }

    #[test]
    fn test_render_paints_layout() {
        let sim = simulator(BoardScene::default());
        let img = sim.render();
        assert_eq!(img.dimensions(), (320, 240));
        // Background, marker, surface, orientation bar.
        assert_eq!(img.get_pixel(5, 5)[0], 100);
        assert_eq!(img.get_pixel(45, 45)[0], 30);
        assert_eq!(img.get_pixel(160, 120)[0], 220);
        assert_eq!(img.get_pixel(160, 48)[0], 30);
    }

    #[test]
    fn test_exposure_scales_pixels() {
        let sim = simulator(BoardScene::default().with_exposure(0.5));
        assert_eq!(sim.render().get_pixel(160, 120)[0], 110);
    }

    #[test]
    fn test_scene_can_be_swapped() {
        let sim = simulator(BoardScene::default());
        sim.set_scene(BoardScene::default().without_board());
        assert_eq!(sim.render().get_pixel(160, 120)[0], 100);
        assert!(!sim.scene().board_visible);
    }

    #[test]
    fn test_marker_occlusion_covers_upper_half() {
        let sim = simulator(BoardScene::default().with_marker_occluded(Corner::TopLeft));
        let img = sim.render();
        assert_eq!(img.get_pixel(45, 42)[0], 170);
        assert_eq!(img.get_pixel(45, 53)[0], 30);
    }
}
