//! End-to-end calibration against rendered board frames.

use std::sync::Arc;
use std::time::{Duration, Instant};

use board_calibrator::board::{BoardLayout, ScreenLayout};
use board_calibrator::calibration::{
    BoardCalibrator, CalibrationService, CalibrationState, StateTransition,
};
use board_calibrator::camera::{Frame, FrameSession, FrameSource};
use board_calibrator::config::CalibratorConfig;
use board_calibrator::geometry::{Corner, Point};
use board_calibrator::recognition::{RecognitionEngine, RecognitionResult};
use board_calibrator::simulation::{BoardScene, BoardSimulator};

const TICK: Duration = Duration::from_millis(50);

struct Rig {
    config: CalibratorConfig,
    calibrator: BoardCalibrator,
    simulator: BoardSimulator,
    t0: Instant,
    frames: u32,
}

impl Rig {
    fn new() -> Self {
        let config = CalibratorConfig::default();
        let engine = Arc::new(RecognitionEngine::new(&config));
        let mut calibrator = BoardCalibrator::new(&config, engine);
        let simulator = BoardSimulator::new(BoardLayout::new(&config.board), BoardScene::default());
        let t0 = Instant::now();
        calibrator.start_find_bounds_at(t0);
        Self {
            config,
            calibrator,
            simulator,
            t0,
            frames: 0,
        }
    }

    fn feed(&mut self, source: FrameSource) -> Option<StateTransition> {
        self.frames += 1;
        let frame = Frame::new(
            self.simulator.render(),
            self.t0 + TICK * self.frames,
            self.frames as u64,
            source,
        );
        self.calibrator.update_bounds_with_image(&frame)
    }
}

#[test]
fn stable_board_calibrates_on_twentieth_frame() {
    let mut rig = Rig::new();

    for _ in 0..19 {
        assert!(rig.feed(FrameSource::Simulated).is_none());
        assert!(rig.calibrator.last_result().unwrap().is_found());
    }
    let transition = rig.feed(FrameSource::Simulated).unwrap();
    assert_eq!(transition.to, CalibrationState::Calibrated);
    assert_eq!(rig.frames, 20);
    assert_eq!(rig.calibrator.publish_count(), 1);

    // Transform maps the accepted quad onto the screen reference quad.
    let bounds = rig.calibrator.board_bounds().unwrap();
    let expected_bounds = rig.simulator.marker_centers_in_image();
    assert!(bounds.max_corner_distance(&expected_bounds) < 0.5);

    let screen = ScreenLayout::new(BoardLayout::new(&rig.config.board), &rig.config.screen);
    let transform = rig.calibrator.transform().unwrap();
    let mapped = transform.apply_quad(&bounds).unwrap();
    assert!(mapped.max_corner_distance(&screen.reference_quad()) < 1e-6);

    for _ in 0..5 {
        assert!(rig.feed(FrameSource::Simulated).is_none());
    }
    assert_eq!(rig.calibrator.publish_count(), 1);
}

#[test]
fn obstruction_delays_calibration_by_a_full_interval() {
    let mut rig = Rig::new();
    rig.simulator
        .set_scene(BoardScene::default().with_marker_occluded(Corner::BottomRight));

    for _ in 0..5 {
        rig.feed(FrameSource::Simulated);
        assert_eq!(
            rig.calibrator.last_result(),
            Some(RecognitionResult::Obstructed)
        );
    }
    assert!((rig.calibrator.brightness().value() - 0.995).abs() < 1e-5);

    rig.simulator.set_scene(BoardScene::default());
    for _ in 0..19 {
        assert!(rig.feed(FrameSource::Simulated).is_none());
    }
    assert_eq!(rig.calibrator.state(), CalibrationState::Calibrating);

    let transition = rig.feed(FrameSource::Simulated);
    assert_eq!(transition.map(|t| t.to), Some(CalibrationState::Calibrated));
    assert_eq!(rig.frames, 25);
}

#[test]
fn brightness_stays_in_range_while_board_missing() {
    let mut rig = Rig::new();
    rig.simulator.set_scene(BoardScene::default().without_board());

    let (dark, bright) = rig.calibrator.brightness().limits();
    let mut previous = rig.calibrator.brightness().value();
    for _ in 0..40 {
        rig.feed(FrameSource::Simulated);
        let value = rig.calibrator.brightness().value();
        assert!(value >= dark && value <= bright);
        assert!(((value - previous).abs() - 0.001).abs() < 1e-5);
        previous = value;
    }
    assert_eq!(rig.calibrator.state(), CalibrationState::Calibrating);
    assert!(rig.calibrator.transform().is_none());
}

#[test]
fn camera_and_simulated_frames_behave_alike() {
    let mut simulated = Rig::new();
    let mut camera = Rig::new();
    let scenes = [
        BoardScene::default().without_board(),
        BoardScene::default().with_marker_occluded(Corner::TopRight),
        BoardScene::default().with_rotation(4.0),
    ];

    for scene in scenes.iter().cycle().take(9).chain(std::iter::repeat(&scenes[2]).take(20)) {
        simulated.simulator.set_scene(scene.clone());
        camera.simulator.set_scene(scene.clone());
        let a = simulated.feed(FrameSource::Simulated);
        let b = camera.feed(FrameSource::Camera);
        assert_eq!(a, b);
        assert_eq!(simulated.calibrator.state(), camera.calibrator.state());
        assert_eq!(
            simulated.calibrator.last_result(),
            camera.calibrator.last_result()
        );
        assert_eq!(
            simulated.calibrator.brightness(),
            camera.calibrator.brightness()
        );
    }

    assert_eq!(simulated.calibrator.state(), CalibrationState::Calibrated);
    assert_eq!(
        simulated.calibrator.transform(),
        camera.calibrator.transform()
    );
}

#[test]
fn restart_from_calibrated_withdraws_transform() {
    let mut rig = Rig::new();
    for _ in 0..20 {
        rig.feed(FrameSource::Simulated);
    }
    assert!(rig.calibrator.transform().is_some());

    let transition = rig
        .calibrator
        .start_find_bounds_at(rig.t0 + TICK * (rig.frames + 1));
    assert_eq!(
        transition,
        Some(StateTransition {
            from: CalibrationState::Calibrated,
            to: CalibrationState::Calibrating,
        })
    );
    assert!(rig.calibrator.transform().is_none());
    assert!(rig.calibrator.screen_points().is_none());
    assert_eq!(rig.calibrator.brightness().value(), 1.0);
}

#[test]
fn calibrated_transform_locates_board_cells() {
    let mut rig = Rig::new();
    for _ in 0..20 {
        rig.feed(FrameSource::Simulated);
    }
    let transform = rig.calibrator.transform().unwrap();
    let screen = ScreenLayout::new(BoardLayout::new(&rig.config.board), &rig.config.screen);

    // Default scene draws 8 px per board cell starting at (40, 40).
    let cell = screen.camera_to_cell(&transform, Point::new(40.0 + 8.0 * 10.5, 40.0 + 8.0 * 7.5));
    assert_eq!(cell, Some((10, 7)));
    assert_eq!(screen.camera_to_cell(&transform, Point::new(5.0, 5.0)), None);
}

#[test]
fn simulated_session_calibrates() {
    let mut config = CalibratorConfig::default();
    config.session.fast_interval_ms = 10;
    config.acceptance.acceptance_interval_ms = 150;

    let engine = Arc::new(RecognitionEngine::new(&config));
    let simulator = Arc::new(BoardSimulator::new(
        BoardLayout::new(&config.board),
        BoardScene::default(),
    ));

    let mut session = FrameSession::new(&config.session, None);
    let service = CalibrationService::new(
        BoardCalibrator::new(&config, engine),
        Some(session.control()),
        Some(simulator),
    );
    let handle = service.handle();
    let events = handle.subscribe();
    session.register_consumer(Arc::new(service));
    session.start();
    assert!(!session.initialized());

    handle.start_find_bounds();

    let mut reached = false;
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(transition) = events.recv_timeout(Duration::from_millis(200)) {
            if transition.to == CalibrationState::Calibrated {
                reached = true;
                break;
            }
        }
    }
    session.stop();

    assert!(reached, "simulated session never calibrated");
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, CalibrationState::Calibrated);
    assert!(snapshot.transform.is_some());
    assert!(snapshot.board_bounds.is_some());
}
