//! Thread-safe calibration service: the frame consumer a session delivers to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use parking_lot::Mutex;

use super::calibrator::BoardCalibrator;
use super::state::{BrightnessHint, CalibrationState, StateTransition};
use super::CalibrationError;
use crate::camera::{DeliveryInterval, Frame, FrameConsumer, SessionControl};
use crate::geometry::{Quad, Transform};
use crate::recognition::{RecognitionEngine, RecognitionResult};
use crate::simulation::BoardSimulator;

/// Point-in-time copy of the calibrator's public state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSnapshot {
    pub state: CalibrationState,
    pub transform: Option<Transform>,
    pub board_bounds: Option<Quad>,
    pub screen_points: Option<Quad>,
    pub brightness: BrightnessHint,
    pub last_result: Option<RecognitionResult>,
}

struct ServiceShared {
    engine: Arc<RecognitionEngine>,
    calibrator: Mutex<BoardCalibrator>,
    /// Bumped on every reset; results recognized under an older epoch are dropped.
    epoch: AtomicU64,
    /// Set while a frame is being recognized.
    busy: AtomicBool,
    control: Option<SessionControl>,
    simulator: Option<Arc<BoardSimulator>>,
    subscribers: Mutex<Vec<Sender<StateTransition>>>,
}

impl ServiceShared {
    fn broadcast(&self, transition: StateTransition) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(transition).is_ok());
    }

    fn set_interval(&self, preset: DeliveryInterval) {
        if let Some(control) = &self.control {
            control.set_interval(preset);
        }
    }
}

/// Receives frames from a [`FrameSession`](crate::camera::FrameSession),
/// recognizes them, and drives the [`BoardCalibrator`].
///
/// Recognition runs with the calibrator unlocked so readers are never
/// blocked behind a frame. While a frame is in flight further frames are
/// dropped. The session gate is left to its owner: a paused session stays
/// paused however many frames pass through here.
pub struct CalibrationService {
    shared: Arc<ServiceShared>,
}

impl CalibrationService {
    /// `control` receives delivery interval changes, `simulator` supplies
    /// frames when no camera is available.
    pub fn new(
        calibrator: BoardCalibrator,
        control: Option<SessionControl>,
        simulator: Option<Arc<BoardSimulator>>,
    ) -> Self {
        Self {
            shared: Arc::new(ServiceShared {
                engine: calibrator.engine().clone(),
                calibrator: Mutex::new(calibrator),
                epoch: AtomicU64::new(0),
                busy: AtomicBool::new(false),
                control,
                simulator,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Reader handle for other threads.
    pub fn handle(&self) -> CalibrationHandle {
        CalibrationHandle {
            shared: self.shared.clone(),
        }
    }
}

impl FrameConsumer for CalibrationService {
    fn deliver_frame(&self, frame: Frame) {
        let shared = &self.shared;
        if shared.busy.swap(true, Ordering::AcqRel) {
            log::trace!("Frame {} dropped, recognizer busy", frame.frame_number());
            return;
        }

        let epoch = shared.epoch.load(Ordering::Acquire);
        if shared.calibrator.lock().state().is_calibrating() {
            let result = shared.engine.recognize(&frame);
            log::debug!("Frame {}: {}", frame.frame_number(), result);

            let transition = {
                let mut calibrator = shared.calibrator.lock();
                if shared.epoch.load(Ordering::Acquire) == epoch {
                    calibrator.apply_recognition(frame.timestamp(), result)
                } else {
                    log::debug!("Discarding result from before reset");
                    None
                }
            };

            if let Some(transition) = transition {
                if transition.to.is_calibrated() {
                    shared.set_interval(DeliveryInterval::Default);
                }
                shared.broadcast(transition);
            }
        }

        shared.busy.store(false, Ordering::Release);
    }

    fn request_simulated_frame(&self) -> Option<RgbaImage> {
        self.shared.simulator.as_ref().map(|sim| sim.render())
    }
}

/// Cloneable access to a running [`CalibrationService`].
#[derive(Clone)]
pub struct CalibrationHandle {
    shared: Arc<ServiceShared>,
}

impl CalibrationHandle {
    /// Restart calibration and switch the session to its fast cadence.
    pub fn start_find_bounds(&self) {
        let transition = {
            let mut calibrator = self.shared.calibrator.lock();
            self.shared.epoch.fetch_add(1, Ordering::AcqRel);
            calibrator.start_find_bounds()
        };
        self.shared.set_interval(DeliveryInterval::Fast);
        if let Some(transition) = transition {
            self.shared.broadcast(transition);
        }
    }

    /// Channel receiving every subsequent state transition.
    pub fn subscribe(&self) -> Receiver<StateTransition> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        let calibrator = self.shared.calibrator.lock();
        CalibrationSnapshot {
            state: calibrator.state(),
            transform: calibrator.transform(),
            board_bounds: calibrator.board_bounds(),
            screen_points: calibrator.screen_points(),
            brightness: calibrator.brightness(),
            last_result: calibrator.last_result(),
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.shared.calibrator.lock().state()
    }

    pub fn transform(&self) -> Option<Transform> {
        self.shared.calibrator.lock().transform()
    }

    pub fn require_transform(&self) -> Result<Transform, CalibrationError> {
        self.shared.calibrator.lock().require_transform()
    }

    pub fn brightness(&self) -> BrightnessHint {
        self.shared.calibrator.lock().brightness()
    }

    pub fn simulator(&self) -> Option<&Arc<BoardSimulator>> {
        self.shared.simulator.as_ref()
    }
}
