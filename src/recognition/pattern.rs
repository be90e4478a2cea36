//! Pattern stage: confirm a boundary candidate really is the board.

use super::{PreparedFrame, RecognitionResult, RecognitionStage};
use crate::board::{BarEdge, BoardLayout};
use crate::config::RecognitionConfig;
use crate::geometry::{Point, Quad, Transform};

const BAR_SAMPLES: usize = 7;

/// Samples the board interior and the orientation bar through the
/// candidate's homography.
///
/// The interior must read light and exactly one of the two long edges must
/// carry the bar. A bar on the bottom edge means the board is upside down in
/// the frame; the quad is relabelled so its top-left is the board's.
pub struct PatternVerifier {
    board: BoardLayout,
    config: RecognitionConfig,
}

impl PatternVerifier {
    pub fn new(board: BoardLayout, config: RecognitionConfig) -> Self {
        Self { board, config }
    }

    /// Fraction of board-space `points` whose image luma satisfies `pred`.
    /// Samples outside the frame count as disagreeing.
    fn agreement(
        &self,
        frame: &PreparedFrame,
        to_image: &Transform,
        points: &[Point],
        pred: impl Fn(u8) -> bool,
    ) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let hits = points
            .iter()
            .filter_map(|p| to_image.apply(*p))
            .filter_map(|p| frame.sample(p))
            .filter(|&v| pred(v))
            .count();
        hits as f64 / points.len() as f64
    }
}

impl RecognitionStage for PatternVerifier {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn recognize(&self, frame: &PreparedFrame, candidate: Option<&Quad>) -> RecognitionResult {
        let Some(quad) = candidate else {
            return RecognitionResult::NotFound;
        };
        let Ok(to_image) = Transform::from_quads(&self.board.marker_centers(), quad) else {
            return RecognitionResult::NotFound;
        };

        let threshold = frame.threshold();
        let min_agreement = self.config.pattern_min_agreement;
        let is_light = |v: u8| v >= threshold;
        let is_dark = |v: u8| v < threshold;

        let interior = self.board.interior_samples(self.config.pattern_samples);
        let light = self.agreement(frame, &to_image, &interior, is_light);
        if light < min_agreement {
            log::trace!("Interior only {:.0}% light", light * 100.0);
            return RecognitionResult::NotFound;
        }

        let top = self.agreement(
            frame,
            &to_image,
            &self.board.bar_samples(BarEdge::Top, BAR_SAMPLES),
            is_dark,
        );
        let bottom = self.agreement(
            frame,
            &to_image,
            &self.board.bar_samples(BarEdge::Bottom, BAR_SAMPLES),
            is_dark,
        );
        let absent = 1.0 - min_agreement;

        if top >= min_agreement && bottom <= absent {
            RecognitionResult::Found(*quad)
        } else if bottom >= min_agreement && top <= absent {
            RecognitionResult::Found(quad.rotated(2))
        } else {
            log::trace!(
                "Orientation bar ambiguous (top {:.2}, bottom {:.2})",
                top,
                bottom
            );
            RecognitionResult::NotFound
        }
    }
}
