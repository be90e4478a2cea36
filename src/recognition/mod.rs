//! Board recognition: boundary detection followed by pattern verification.

mod bounds;
mod components;
mod pattern;

pub use bounds::BoundsRecognizer;
pub use components::{dark_components, Blob};
pub use pattern::PatternVerifier;

use image::GrayImage;

use crate::board::BoardLayout;
use crate::camera::Frame;
use crate::config::CalibratorConfig;
use crate::geometry::{Point, Quad};

/// Classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecognitionResult {
    /// No qualifying board in view.
    NotFound,
    /// Board markers present but partly blocked.
    Obstructed,
    /// Board found; corners in canonical order.
    Found(Quad),
}

impl RecognitionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, RecognitionResult::Found(_))
    }

    pub fn quad(&self) -> Option<&Quad> {
        match self {
            RecognitionResult::Found(quad) => Some(quad),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecognitionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionResult::NotFound => write!(f, "Board not visible"),
            RecognitionResult::Obstructed => write!(f, "Board obstructed"),
            RecognitionResult::Found(_) => write!(f, "Board found"),
        }
    }
}

/// Luma image plus the dark threshold shared by all stages.
pub struct PreparedFrame {
    luma: GrayImage,
    threshold: u8,
}

impl PreparedFrame {
    /// Threshold is `mean luma * ratio`, so it follows scene exposure.
    pub fn new(luma: GrayImage, threshold_ratio: f32) -> Self {
        let histogram = &imageproc::stats::histogram(&luma).channels[0];
        let count: u64 = histogram.iter().map(|&n| n as u64).sum();
        let mean = if count == 0 {
            0.0
        } else {
            let total: u64 = histogram
                .iter()
                .enumerate()
                .map(|(v, &n)| v as u64 * n as u64)
                .sum();
            total as f32 / count as f32
        };
        let threshold = (mean * threshold_ratio).round().clamp(0.0, 255.0) as u8;
        Self { luma, threshold }
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Luma of the pixel containing `p`, if inside the frame.
    pub fn sample(&self, p: Point) -> Option<u8> {
        if !(p.x >= 0.0 && p.y >= 0.0) {
            return None;
        }
        let (x, y) = (p.x.floor() as u32, p.y.floor() as u32);
        if x >= self.luma.width() || y >= self.luma.height() {
            return None;
        }
        Some(self.luma.get_pixel(x, y)[0])
    }
}

/// One step of the recognition pipeline.
///
/// `candidate` is the quad found by the previous stage, `None` for the first.
pub trait RecognitionStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, frame: &PreparedFrame, candidate: Option<&Quad>) -> RecognitionResult;
}

/// Runs stages in order; the first non-`Found` result ends the frame.
pub struct RecognitionEngine {
    stages: Vec<Box<dyn RecognitionStage>>,
    threshold_ratio: f32,
}

impl RecognitionEngine {
    /// Boundary stage followed by pattern stage.
    pub fn new(config: &CalibratorConfig) -> Self {
        let board = BoardLayout::new(&config.board);
        Self::with_stages(
            vec![
                Box::new(BoundsRecognizer::new(board.clone(), config.recognition.clone())),
                Box::new(PatternVerifier::new(board, config.recognition.clone())),
            ],
            config.recognition.dark_threshold_ratio,
        )
    }

    pub fn with_stages(stages: Vec<Box<dyn RecognitionStage>>, threshold_ratio: f32) -> Self {
        Self {
            stages,
            threshold_ratio,
        }
    }

    pub fn recognize(&self, frame: &Frame) -> RecognitionResult {
        self.recognize_luma(frame.to_luma())
    }

    pub fn recognize_luma(&self, luma: GrayImage) -> RecognitionResult {
        let prepared = PreparedFrame::new(luma, self.threshold_ratio);
        let mut candidate: Option<Quad> = None;

        for stage in &self.stages {
            match stage.recognize(&prepared, candidate.as_ref()) {
                RecognitionResult::Found(quad) => candidate = Some(quad),
                other => {
                    log::debug!("Stage '{}': {}", stage.name(), other);
                    return other;
                }
            }
        }

        match candidate {
            Some(quad) => RecognitionResult::Found(quad),
            None => RecognitionResult::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Corner;
    use crate::simulation::{BoardScene, BoardSimulator};
    use approx::assert_relative_eq;

    fn engine() -> RecognitionEngine {
        RecognitionEngine::new(&CalibratorConfig::default())
    }

    fn simulator(scene: BoardScene) -> BoardSimulator {
        BoardSimulator::new(BoardLayout::new(&CalibratorConfig::default().board), scene)
    }

    fn luma_of(sim: &BoardSimulator) -> GrayImage {
        image::imageops::grayscale(&sim.render())
    }

    struct FixedStage(RecognitionResult);

    impl RecognitionStage for FixedStage {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(&self, _frame: &PreparedFrame, _candidate: Option<&Quad>) -> RecognitionResult {
            self.0
        }
    }

    struct PanicStage;

    impl RecognitionStage for PanicStage {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn recognize(&self, _frame: &PreparedFrame, _candidate: Option<&Quad>) -> RecognitionResult {
            panic!("stage after a failure must not run");
        }
    }

    #[test]
    fn test_upright_board_is_found_at_marker_centers() {
        let sim = simulator(BoardScene::default());
        let result = engine().recognize_luma(luma_of(&sim));
        let quad = result.quad().copied().expect("board should be found");

        let expected = sim.marker_centers_in_image();
        for (got, want) in quad.points().iter().zip(expected.points().iter()) {
            assert_relative_eq!(got.x, want.x, epsilon = 0.5);
            assert_relative_eq!(got.y, want.y, epsilon = 0.5);
        }
    }

    #[test]
    fn test_tilted_board_is_found() {
        let sim = simulator(BoardScene::default().with_rotation(12.0));
        assert!(engine().recognize_luma(luma_of(&sim)).is_found());
    }

    #[test]
    fn test_upside_down_board_keeps_board_top_left() {
        let sim = simulator(BoardScene::default().with_rotation(180.0));
        let result = engine().recognize_luma(luma_of(&sim));
        let quad = result.quad().copied().expect("board should be found");

        // The board's top-left marker now sits at the bottom-right of the frame.
        let expected = sim.marker_centers_in_image();
        let tl = quad.corner(Corner::TopLeft);
        assert_relative_eq!(tl.x, expected.corner(Corner::TopLeft).x, epsilon = 0.5);
        assert_relative_eq!(tl.y, expected.corner(Corner::TopLeft).y, epsilon = 0.5);
        assert!(tl.x > 160.0 && tl.y > 120.0);
    }

    #[test]
    fn test_dim_scene_is_still_found() {
        let sim = simulator(BoardScene::default().with_exposure(0.3));
        assert!(engine().recognize_luma(luma_of(&sim)).is_found());
    }

    #[test]
    fn test_empty_scene_is_not_found() {
        let sim = simulator(BoardScene::default().without_board());
        assert_eq!(
            engine().recognize_luma(luma_of(&sim)),
            RecognitionResult::NotFound
        );
        assert_eq!(
            engine().recognize_luma(GrayImage::new(32, 32)),
            RecognitionResult::NotFound
        );
    }

    #[test]
    fn test_half_covered_marker_is_obstructed() {
        let sim = simulator(BoardScene::default().with_marker_occluded(Corner::TopLeft));
        assert_eq!(
            engine().recognize_luma(luma_of(&sim)),
            RecognitionResult::Obstructed
        );
    }

    #[test]
    fn test_board_without_orientation_bar_is_rejected() {
        let sim = simulator(BoardScene::default().without_orientation_bar());
        assert_eq!(
            engine().recognize_luma(luma_of(&sim)),
            RecognitionResult::NotFound
        );
    }

    #[test]
    fn test_failure_classification_passes_through_unchanged() {
        let engine = RecognitionEngine::with_stages(
            vec![
                Box::new(FixedStage(RecognitionResult::Obstructed)),
                Box::new(PanicStage),
            ],
            0.5,
        );
        assert_eq!(
            engine.recognize_luma(GrayImage::new(4, 4)),
            RecognitionResult::Obstructed
        );
    }

    #[test]
    fn test_threshold_follows_mean() {
        let prepared = PreparedFrame::new(GrayImage::from_pixel(4, 4, image::Luma([200])), 0.5);
        assert_eq!(prepared.threshold(), 100);
        assert_eq!(prepared.sample(Point::new(3.9, 0.0)), Some(200));
        assert_eq!(prepared.sample(Point::new(4.0, 0.0)), None);
        assert_eq!(prepared.sample(Point::new(-0.1, 0.0)), None);
    }
}
