//! Board calibration state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::publisher::{PublishedCalibration, TransformPublisher};
use super::state::{BrightnessHint, CalibrationState, StateTransition};
use super::CalibrationError;
use crate::board::{BoardLayout, ScreenLayout};
use crate::camera::Frame;
use crate::config::{AcceptanceConfig, CalibratorConfig};
use crate::geometry::{Quad, Transform};
use crate::recognition::{RecognitionEngine, RecognitionResult};

/// Turns a stream of recognition results into a published transform.
///
/// A board must be found, and stay put, for a continuous acceptance interval
/// before its quad is accepted. Any failure restarts the interval and nudges
/// the brightness hint. Time is taken from frame timestamps, so the same
/// sequence of frames always produces the same outcome.
pub struct BoardCalibrator {
    acceptance: AcceptanceConfig,
    engine: Arc<RecognitionEngine>,
    state: CalibrationState,
    brightness: BrightnessHint,
    accumulated: Duration,
    last_update: Option<Instant>,
    previous: Option<Quad>,
    last_result: Option<RecognitionResult>,
    publisher: TransformPublisher,
    notifier: Option<Sender<StateTransition>>,
}

impl BoardCalibrator {
    pub fn new(config: &CalibratorConfig, engine: Arc<RecognitionEngine>) -> Self {
        let screen = ScreenLayout::new(BoardLayout::new(&config.board), &config.screen);
        Self {
            acceptance: config.acceptance.clone(),
            engine,
            state: CalibrationState::Uncalibrated,
            brightness: BrightnessHint::neutral(&config.acceptance),
            accumulated: Duration::ZERO,
            last_update: None,
            previous: None,
            last_result: None,
            publisher: TransformPublisher::new(screen.reference_quad()),
            notifier: None,
        }
    }

    /// Send every state transition on `notifier` as well as returning it.
    pub fn with_notifier(mut self, notifier: Sender<StateTransition>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Begin (or restart) calibration from any state.
    pub fn start_find_bounds(&mut self) -> Option<StateTransition> {
        self.start_find_bounds_at(Instant::now())
    }

    /// [`start_find_bounds`](Self::start_find_bounds) with an explicit clock.
    pub fn start_find_bounds_at(&mut self, now: Instant) -> Option<StateTransition> {
        self.accumulated = Duration::ZERO;
        self.previous = None;
        self.last_result = None;
        self.last_update = Some(now);
        self.brightness = BrightnessHint::neutral(&self.acceptance);
        self.publisher.withdraw();
        log::info!("Searching for board bounds");
        self.transition(CalibrationState::Calibrating)
    }

    /// Recognize `frame` and feed the result to the state machine.
    /// Does nothing unless calibrating.
    pub fn update_bounds_with_image(&mut self, frame: &Frame) -> Option<StateTransition> {
        if !self.state.is_calibrating() {
            return None;
        }
        let result = self.engine.recognize(frame);
        log::debug!("Frame {}: {}", frame.frame_number(), result);
        self.apply_recognition(frame.timestamp(), result)
    }

    /// Advance the state machine with a result recognized at `timestamp`.
    pub fn apply_recognition(
        &mut self,
        timestamp: Instant,
        result: RecognitionResult,
    ) -> Option<StateTransition> {
        if !self.state.is_calibrating() {
            return None;
        }

        let elapsed = self
            .last_update
            .map(|last| timestamp.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_update = Some(timestamp);
        self.last_result = Some(result);

        let RecognitionResult::Found(quad) = result else {
            self.fail(None);
            return None;
        };

        let stable = self
            .previous
            .map(|prev| prev.max_corner_distance(&quad) <= self.acceptance.stability_tolerance)
            .unwrap_or(true);
        if !stable {
            log::debug!("Board moved, restarting acceptance interval");
            self.fail(Some(quad));
            return None;
        }

        self.accumulated += elapsed;
        self.previous = Some(quad);
        if self.accumulated < self.acceptance.acceptance_interval() {
            return None;
        }

        match self.publisher.publish(quad) {
            Ok(published) => {
                log::info!(
                    "Board accepted after {:?}, transform {:?}",
                    self.accumulated,
                    published.transform.to_array()
                );
                self.transition(CalibrationState::Calibrated)
            }
            Err(e) => {
                log::warn!("Rejecting accepted bounds: {}", e);
                self.fail(None);
                None
            }
        }
    }

    fn fail(&mut self, candidate: Option<Quad>) {
        self.accumulated = Duration::ZERO;
        self.previous = candidate;
        self.brightness.step();
    }

    fn transition(&mut self, to: CalibrationState) -> Option<StateTransition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        let transition = StateTransition { from, to };
        log::info!("Calibration: {} -> {}", from, to);
        if let Some(tx) = &self.notifier {
            if tx.send(transition).is_err() {
                log::debug!("Transition subscriber gone");
                self.notifier = None;
            }
        }
        Some(transition)
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    fn published(&self) -> Option<&PublishedCalibration> {
        if self.state.is_calibrated() {
            self.publisher.current()
        } else {
            None
        }
    }

    /// Accepted board quad in camera space.
    pub fn board_bounds(&self) -> Option<Quad> {
        self.published().map(|p| p.board_bounds)
    }

    /// Screen quad the board was mapped onto.
    pub fn screen_points(&self) -> Option<Quad> {
        self.published().map(|p| p.screen_points)
    }

    /// Camera-to-screen transform.
    pub fn transform(&self) -> Option<Transform> {
        self.published().map(|p| p.transform)
    }

    pub fn require_transform(&self) -> Result<Transform, CalibrationError> {
        self.transform().ok_or(CalibrationError::NotCalibrated(self.state))
    }

    pub fn brightness(&self) -> BrightnessHint {
        self.brightness
    }

    pub fn last_result(&self) -> Option<RecognitionResult> {
        self.last_result
    }

    /// Stable time collected towards acceptance.
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn publish_count(&self) -> u64 {
        self.publisher.publish_count()
    }

    pub fn engine(&self) -> &Arc<RecognitionEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crossbeam_channel::unbounded;

    const TICK: Duration = Duration::from_millis(50);

    fn calibrator() -> BoardCalibrator {
        let config = CalibratorConfig::default();
        let engine = Arc::new(RecognitionEngine::new(&config));
        BoardCalibrator::new(&config, engine)
    }

    fn board() -> Quad {
        Quad::from_rect(48.0, 48.0, 224.0, 144.0)
    }

    fn found() -> RecognitionResult {
        RecognitionResult::Found(board())
    }

    #[test]
    fn test_starts_uncalibrated_and_ignores_results() {
        let mut cal = calibrator();
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
        assert!(cal.apply_recognition(Instant::now(), found()).is_none());
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
        assert!(cal.transform().is_none());
    }

    #[test]
    fn test_twenty_stable_frames_calibrate_on_the_last() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);

        for i in 1..=19 {
            assert!(cal.apply_recognition(t0 + TICK * i, found()).is_none());
            assert_eq!(cal.state(), CalibrationState::Calibrating);
        }
        let transition = cal.apply_recognition(t0 + TICK * 20, found());
        assert_eq!(
            transition,
            Some(StateTransition {
                from: CalibrationState::Calibrating,
                to: CalibrationState::Calibrated,
            })
        );
        assert_eq!(cal.board_bounds(), Some(board()));
        assert_eq!(cal.publish_count(), 1);

        // Sticky: more frames change nothing.
        cal.apply_recognition(t0 + TICK * 21, RecognitionResult::NotFound);
        assert_eq!(cal.state(), CalibrationState::Calibrated);
        assert_eq!(cal.publish_count(), 1);
    }

    #[test]
    fn test_failure_resets_accumulator_and_steps_brightness() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);
        let neutral = cal.brightness().value();

        for i in 1..=10 {
            cal.apply_recognition(t0 + TICK * i, found());
        }
        assert_eq!(cal.accumulated(), TICK * 10);

        cal.apply_recognition(t0 + TICK * 11, RecognitionResult::Obstructed);
        assert_eq!(cal.accumulated(), Duration::ZERO);
        assert_eq!(cal.last_result(), Some(RecognitionResult::Obstructed));
        assert!((neutral - cal.brightness().value() - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_moving_board_restarts_interval() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);

        for i in 1..=15 {
            cal.apply_recognition(t0 + TICK * i, found());
        }
        let moved = RecognitionResult::Found(Quad::from_rect(80.0, 48.0, 224.0, 144.0));
        cal.apply_recognition(t0 + TICK * 16, moved);
        assert_eq!(cal.accumulated(), Duration::ZERO);

        // Stable against the moved candidate from here on.
        cal.apply_recognition(t0 + TICK * 17, moved);
        assert_eq!(cal.accumulated(), TICK);
    }

    #[test]
    fn test_small_jitter_is_stable() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);
        cal.apply_recognition(t0 + TICK, found());
        let jittered = RecognitionResult::Found(Quad::from_rect(50.0, 47.0, 224.0, 144.0));
        cal.apply_recognition(t0 + TICK * 2, jittered);
        assert_eq!(cal.accumulated(), TICK * 2);
    }

    #[test]
    fn test_restart_withdraws_transform() {
        let (tx, rx) = unbounded();
        let mut cal = calibrator().with_notifier(tx);
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);
        for i in 1..=20 {
            cal.apply_recognition(t0 + TICK * i, found());
        }
        assert!(cal.require_transform().is_ok());

        let transition = cal.start_find_bounds_at(t0 + TICK * 21);
        assert_eq!(transition.map(|t| t.from), Some(CalibrationState::Calibrated));
        assert!(cal.transform().is_none());
        assert!(cal.board_bounds().is_none());
        assert_eq!(
            cal.require_transform(),
            Err(CalibrationError::NotCalibrated(CalibrationState::Calibrating))
        );

        let seen: Vec<_> = rx.try_iter().map(|t| t.to).collect();
        assert_eq!(
            seen,
            vec![
                CalibrationState::Calibrating,
                CalibrationState::Calibrated,
                CalibrationState::Calibrating,
            ]
        );
    }

    #[test]
    fn test_degenerate_quad_counts_as_failure() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);
        let p = Point::new(10.0, 10.0);
        let flat = RecognitionResult::Found(Quad::new([p, p, p, p]));
        for i in 1..=25 {
            cal.apply_recognition(t0 + TICK * i, flat);
        }
        assert_eq!(cal.state(), CalibrationState::Calibrating);
        assert!(cal.transform().is_none());
    }

    #[test]
    fn test_published_transform_maps_markers_to_screen() {
        let mut cal = calibrator();
        let t0 = Instant::now();
        cal.start_find_bounds_at(t0);
        for i in 1..=20 {
            cal.apply_recognition(t0 + TICK * i, found());
        }
        let transform = cal.transform().unwrap();
        let screen = cal.screen_points().unwrap();
        let mapped = transform.apply_quad(&board()).unwrap();
        assert!(mapped.max_corner_distance(&screen) < 1e-6);
    }
}
