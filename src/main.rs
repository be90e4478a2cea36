//! Board Calibrator
//!
//! Entry point: runs one calibration against a camera or the simulated board
//! and logs the resulting transform.
//!
//! Usage: `board-calibrator [CONFIG] [--camera INDEX] [--frames N]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use board_calibrator::board::BoardLayout;
use board_calibrator::calibration::{BoardCalibrator, CalibrationService, CalibrationState};
use board_calibrator::camera::{CaptureSource, FrameSession};
use board_calibrator::config::CalibratorConfig;
use board_calibrator::recognition::RecognitionEngine;
use board_calibrator::simulation::{BoardScene, BoardSimulator};

/// Frames to wait for calibration before giving up.
const DEFAULT_FRAME_LIMIT: u64 = 200;

struct Args {
    config: Option<PathBuf>,
    camera: Option<u32>,
    frames: u64,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        camera: None,
        frames: DEFAULT_FRAME_LIMIT,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--camera" => {
                let value = iter.next().ok_or("--camera needs an index")?;
                args.camera = Some(value.parse().map_err(|_| format!("bad camera index: {}", value))?);
            }
            "--frames" => {
                let value = iter.next().ok_or("--frames needs a count")?;
                args.frames = value.parse().map_err(|_| format!("bad frame count: {}", value))?;
            }
            other if other.starts_with("--") => return Err(format!("unknown option: {}", other)),
            path => args.config = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

#[cfg(feature = "camera")]
fn capture_source(index: Option<u32>) -> Option<Arc<dyn CaptureSource>> {
    for info in board_calibrator::camera::list_cameras() {
        log::info!("Camera {}: {}", info.index, info.name);
    }
    index.map(|i| Arc::new(board_calibrator::camera::NokhwaSource::new(i)) as Arc<dyn CaptureSource>)
}

#[cfg(not(feature = "camera"))]
fn capture_source(index: Option<u32>) -> Option<Arc<dyn CaptureSource>> {
    if index.is_some() {
        log::warn!("Built without the `camera` feature, using the simulated board");
    }
    None
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Usage: board-calibrator [CONFIG] [--camera INDEX] [--frames N]");
            std::process::exit(2);
        }
    };

    let mut config = match &args.config {
        Some(path) => match CalibratorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => CalibratorConfig::default(),
    };
    if args.camera.is_some() {
        config.session.camera_index = args.camera;
    }

    log::info!("Board Calibrator starting...");

    let engine = Arc::new(RecognitionEngine::new(&config));
    let simulator = Arc::new(BoardSimulator::new(
        BoardLayout::new(&config.board),
        BoardScene::default(),
    ));

    let mut session = FrameSession::new(&config.session, capture_source(config.session.camera_index));
    let service = CalibrationService::new(
        BoardCalibrator::new(&config, engine),
        Some(session.control()),
        Some(simulator),
    );
    let handle = service.handle();
    let events = handle.subscribe();
    session.register_consumer(Arc::new(service));
    session.start();

    if !session.initialized() {
        log::warn!("No camera available, calibrating against the simulated board");
    }

    handle.start_find_bounds();
    let control = session.control();

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(transition) if transition.to == CalibrationState::Calibrated => break,
            Ok(_) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        if control.delivered_count() >= args.frames {
            log::warn!("No calibration after {} frames", args.frames);
            break;
        }
    }

    let snapshot = handle.snapshot();
    match handle.require_transform() {
        Ok(transform) => {
            log::info!("Board bounds: {:?}", snapshot.board_bounds);
            log::info!("Screen points: {:?}", snapshot.screen_points);
            log::info!("Transform: {:?}", transform.to_array());
        }
        Err(e) => {
            log::error!(
                "{} (last frame: {})",
                e,
                snapshot
                    .last_result
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "none".into())
            );
        }
    }

    session.stop();
    log::info!("Board Calibrator exiting");
}
