//! Boundary stage: find the four corner fiducials and the quad they span.

use super::components::{dark_components, Blob};
use super::{PreparedFrame, RecognitionResult, RecognitionStage};
use crate::board::BoardLayout;
use crate::config::RecognitionConfig;
use crate::geometry::Quad;

/// Marker-like blobs considered when searching for the board quad.
const MAX_CANDIDATES: usize = 8;

/// Largest allowed area ratio between the four markers of one quad.
const MAX_MARKER_AREA_RATIO: usize = 4;

/// Locates the board by its corner markers.
///
/// Marker-like blobs are dark components of plausible size that are not
/// strongly elongated. Every 4-subset of the largest candidates is tried and
/// the largest convex quad with the board's proportions wins, so pieces and
/// other dark objects on or around the board do not displace a real marker.
///
/// A winning quad with a cut marker (not square, ragged, or clipped by the
/// frame edge) is `Obstructed`. With no winning quad the frame is
/// `Obstructed` only if some visible markers are spaced like board corners;
/// otherwise the board is simply not in view.
pub struct BoundsRecognizer {
    board: BoardLayout,
    config: RecognitionConfig,
}

impl BoundsRecognizer {
    pub fn new(board: BoardLayout, config: RecognitionConfig) -> Self {
        Self { board, config }
    }

    fn is_marker_like(&self, blob: &Blob, max_area: f64) -> bool {
        let squareness = blob.squareness();
        blob.area as f64 <= max_area
            && squareness > 0.0
            && 1.0 / squareness <= self.config.max_marker_elongation
    }

    fn is_complete(&self, blob: &Blob) -> bool {
        !blob.touches_border
            && blob.squareness() >= self.config.min_marker_squareness
            && blob.fill_ratio() >= self.config.min_marker_fill
    }

    fn within_tolerance(&self, value: f64, expected: f64) -> bool {
        expected > 0.0 && (value / expected - 1.0).abs() <= self.config.aspect_tolerance
    }

    /// Convex, board-proportioned quad through four blob centroids.
    fn candidate_quad(&self, blobs: [&Blob; 4]) -> Option<Quad> {
        let (smallest, largest) = blobs
            .iter()
            .fold((usize::MAX, 0), |(lo, hi), b| (lo.min(b.area), hi.max(b.area)));
        if largest > smallest * MAX_MARKER_AREA_RATIO {
            return None;
        }
        let quad = Quad::from_unordered(blobs.map(|b| b.centroid()));
        if !quad.is_convex() {
            return None;
        }
        if !self.within_tolerance(quad.aspect_ratio(), self.board.marker_aspect()) {
            return None;
        }
        Some(quad)
    }

    /// Largest passing quad over all 4-subsets, with the blobs it was built from.
    fn best_quad<'a>(&self, candidates: &[&'a Blob]) -> Option<(Quad, [&'a Blob; 4])> {
        let n = candidates.len();
        let mut best: Option<(f64, Quad, [&Blob; 4])> = None;
        for a in 0..n {
            for b in a + 1..n {
                for c in b + 1..n {
                    for d in c + 1..n {
                        let blobs = [candidates[a], candidates[b], candidates[c], candidates[d]];
                        let Some(quad) = self.candidate_quad(blobs) else {
                            continue;
                        };
                        let area = quad.signed_area().abs();
                        if best.as_ref().map_or(true, |(best_area, _, _)| area > *best_area) {
                            best = Some((area, quad, blobs));
                        }
                    }
                }
            }
        }
        best.map(|(_, quad, blobs)| (quad, blobs))
    }

    /// Whether two blobs sit like two corner markers of one board: similar
    /// size, separated by an edge or diagonal of the marker layout measured
    /// in marker widths.
    fn pair_fits_board(&self, a: &Blob, b: &Blob) -> bool {
        let (small, large) = (a.area.min(b.area) as f64, a.area.max(b.area) as f64);
        if small <= 0.0 || large / small > 2.0 {
            return false;
        }
        let side = ((a.area + b.area) as f64 / 2.0).sqrt();
        let distance = (a.centroid() - b.centroid()).norm() / side;

        let m = self.board.marker_size;
        let across = (self.board.width - m) / m;
        let down = (self.board.height - m) / m;
        let diagonal = (across * across + down * down).sqrt();
        [across, down, diagonal]
            .iter()
            .any(|&expected| self.within_tolerance(distance, expected))
    }

    fn markers_fit_board(&self, candidates: &[&Blob]) -> bool {
        candidates.iter().enumerate().any(|(i, a)| {
            candidates[i + 1..]
                .iter()
                .any(|b| self.pair_fits_board(a, b))
        })
    }
}

impl RecognitionStage for BoundsRecognizer {
    fn name(&self) -> &'static str {
        "bounds"
    }

    fn recognize(&self, frame: &PreparedFrame, _candidate: Option<&Quad>) -> RecognitionResult {
        let (width, height) = frame.luma().dimensions();
        let max_area = (width as f64) * (height as f64) * self.config.max_marker_area_fraction;

        let blobs = dark_components(frame.luma(), frame.threshold(), self.config.min_marker_area);
        let mut candidates: Vec<&Blob> = blobs
            .iter()
            .filter(|b| self.is_marker_like(b, max_area))
            .collect();
        candidates.sort_by(|a, b| b.area.cmp(&a.area));
        candidates.truncate(MAX_CANDIDATES);

        let Some((quad, markers)) = self.best_quad(&candidates) else {
            if self.markers_fit_board(&candidates) {
                log::trace!("{} marker candidates, no board quad", candidates.len());
                return RecognitionResult::Obstructed;
            }
            return RecognitionResult::NotFound;
        };

        if let Some(cut) = markers.iter().find(|m| !self.is_complete(m)) {
            log::trace!(
                "Incomplete marker at {:?} (squareness {:.2}, fill {:.2})",
                cut.centroid(),
                cut.squareness(),
                cut.fill_ratio()
            );
            return RecognitionResult::Obstructed;
        }

        RecognitionResult::Found(quad)
    }
}
