//! Frame session: owns the capture device and delivers throttled frames to a
//! single consumer on a background thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use image::RgbaImage;

use super::device::{CaptureDevice, CaptureSource};
use super::frame::{Frame, FrameSource};
use crate::config::SessionConfig;

/// Receives frames from a [`FrameSession`].
///
/// Both methods are called on the session's delivery thread, one at a time.
pub trait FrameConsumer: Send + Sync {
    /// Handle one frame. Called at most once per delivery interval.
    fn deliver_frame(&self, frame: Frame);

    /// Supply a substitute image when no capture device is available.
    fn request_simulated_frame(&self) -> Option<RgbaImage>;
}

/// Delivery interval presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryInterval {
    /// Slow cadence outside calibration.
    Default,
    /// Fast cadence while actively calibrating.
    Fast,
}

/// Shared state between the delivery thread and its controllers.
struct SessionShared {
    locked: AtomicBool,
    interval_nanos: AtomicU64,
    initialized: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    default_interval: Duration,
    fast_interval: Duration,
}

/// Cloneable handle to a session's gate and cadence.
///
/// Handed to the consumer so it can pause delivery while it works and switch
/// between interval presets without owning the session.
#[derive(Clone)]
pub struct SessionControl {
    shared: Arc<SessionShared>,
}

impl SessionControl {
    pub fn new(config: &SessionConfig) -> Self {
        let default_interval = config.default_interval();
        Self {
            shared: Arc::new(SessionShared {
                locked: AtomicBool::new(false),
                interval_nanos: AtomicU64::new(default_interval.as_nanos() as u64),
                initialized: AtomicBool::new(false),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                default_interval,
                fast_interval: config.fast_interval(),
            }),
        }
    }

    /// Close the delivery gate. Returns `false` if it was already closed.
    pub fn lock(&self) -> bool {
        !self.shared.locked.swap(true, Ordering::AcqRel)
    }

    /// Reopen the delivery gate.
    pub fn unlock(&self) {
        self.shared.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::Acquire)
    }

    pub fn set_interval(&self, preset: DeliveryInterval) {
        let interval = match preset {
            DeliveryInterval::Default => self.shared.default_interval,
            DeliveryInterval::Fast => self.shared.fast_interval,
        };
        self.set_interval_duration(interval);
    }

    pub fn set_interval_duration(&self, interval: Duration) {
        self.shared
            .interval_nanos
            .store(interval.as_nanos() as u64, Ordering::Release);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.shared.interval_nanos.load(Ordering::Acquire))
    }

    /// Whether the capture device was acquired.
    pub fn initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    pub fn delivered_count(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn record_dropped(&self) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Minimum spacing between delivered frames.
#[derive(Debug, Default)]
struct Throttle {
    last: Option<Instant>,
}

impl Throttle {
    /// Accept `timestamp` if it is at least `interval` after the last accepted one.
    fn admit(&mut self, timestamp: Instant, interval: Duration) -> bool {
        match self.last {
            Some(last) if timestamp.saturating_duration_since(last) < interval => false,
            _ => {
                self.last = Some(timestamp);
                true
            }
        }
    }

    fn next_due(&self, interval: Duration) -> Instant {
        match self.last {
            Some(last) => last + interval,
            None => Instant::now(),
        }
    }
}

/// Commands sent to the delivery thread.
#[derive(Debug)]
enum SessionCommand {
    Stop,
}

/// Owns the capture device for its lifetime and feeds one consumer.
pub struct FrameSession {
    control: SessionControl,
    consumer: Option<Arc<dyn FrameConsumer>>,
    source: Option<Arc<dyn CaptureSource>>,
    open_timeout: Duration,
    command_tx: Option<Sender<SessionCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl FrameSession {
    /// Create a session. With `source == None` the session runs on simulated
    /// frames from the consumer.
    pub fn new(config: &SessionConfig, source: Option<Arc<dyn CaptureSource>>) -> Self {
        Self {
            control: SessionControl::new(config),
            consumer: None,
            source,
            open_timeout: config.open_timeout(),
            command_tx: None,
            thread_handle: None,
        }
    }

    /// Handle to inject into the consumer.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Register the single consumer. Takes effect on the next `start()`.
    pub fn register_consumer(&mut self, consumer: Arc<dyn FrameConsumer>) {
        if self.consumer.is_some() {
            log::warn!("Replacing registered frame consumer");
        }
        self.consumer = Some(consumer);
    }

    /// Acquire the capture device and begin delivery.
    ///
    /// Failure to acquire the device is reported only through
    /// [`initialized`](Self::initialized); the session then delivers
    /// simulated frames.
    pub fn start(&mut self) {
        if self.thread_handle.is_some() {
            log::warn!("Frame session already running");
            return;
        }
        let Some(consumer) = self.consumer.clone() else {
            log::warn!("Frame session started without a registered consumer");
            return;
        };

        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let control = self.control.clone();
        let source = self.source.clone();

        let spawned = thread::Builder::new()
            .name("frame-session".to_string())
            .spawn(move || {
                let device = open_device(source.as_deref());
                control
                    .shared
                    .initialized
                    .store(device.is_some(), Ordering::Release);
                let _ = ready_tx.send(device.is_some());
                delivery_loop(control, consumer, device, command_rx);
            });

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                self.command_tx = Some(command_tx);
            }
            Err(e) => {
                log::error!("Failed to spawn frame session thread: {}", e);
                return;
            }
        }

        match ready_rx.recv_timeout(self.open_timeout) {
            Ok(true) => log::info!("Frame session started with capture device"),
            Ok(false) => log::info!("Frame session started in simulated mode"),
            Err(_) => log::warn!(
                "Capture device did not open within {:?}, continuing",
                self.open_timeout
            ),
        }
    }

    /// Stop delivery and release the capture device.
    pub fn stop(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(SessionCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Frame session thread panicked");
            }
            log::info!(
                "Frame session stopped ({} delivered, {} dropped)",
                self.control.delivered_count(),
                self.control.dropped_count()
            );
        }
        self.control
            .shared
            .initialized
            .store(false, Ordering::Release);
    }

    /// Pause delivery without releasing the device.
    pub fn lock(&self) -> bool {
        self.control.lock()
    }

    pub fn unlock(&self) {
        self.control.unlock()
    }

    pub fn initialized(&self) -> bool {
        self.control.initialized()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl Drop for FrameSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_device(source: Option<&dyn CaptureSource>) -> Option<Box<dyn CaptureDevice>> {
    let source = source?;
    match source.open() {
        Ok(device) => {
            log::info!("Acquired capture device: {}", device.name());
            Some(device)
        }
        Err(e) => {
            log::warn!("{}; falling back to simulated frames", e);
            None
        }
    }
}

fn delivery_loop(
    control: SessionControl,
    consumer: Arc<dyn FrameConsumer>,
    mut device: Option<Box<dyn CaptureDevice>>,
    command_rx: crossbeam_channel::Receiver<SessionCommand>,
) {
    let mut throttle = Throttle::default();
    let mut next_tick = Instant::now();
    let mut frame_number: u64 = 0;

    loop {
        // Devices block in capture(); simulated mode sleeps until the next tick.
        let wait = match device {
            Some(_) => Duration::ZERO,
            None => next_tick.saturating_duration_since(Instant::now()),
        };
        match command_rx.recv_timeout(wait) {
            Ok(SessionCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let interval = control.interval();

        let (image, source) = match device.as_mut() {
            Some(dev) => match dev.capture() {
                Ok(image) => (image, FrameSource::Camera),
                Err(e) => {
                    log::warn!("{}", e);
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }
            },
            None => {
                if control.is_locked() {
                    control.record_dropped();
                    next_tick = Instant::now() + interval;
                    continue;
                }
                match consumer.request_simulated_frame() {
                    Some(image) => (image, FrameSource::Simulated),
                    None => {
                        log::debug!("Consumer supplied no simulated frame");
                        next_tick = Instant::now() + interval;
                        continue;
                    }
                }
            }
        };

        let timestamp = Instant::now();
        if control.is_locked() || !throttle.admit(timestamp, interval) {
            control.record_dropped();
            next_tick = throttle.next_due(interval).max(timestamp);
            continue;
        }

        frame_number += 1;
        control.shared.delivered.fetch_add(1, Ordering::Relaxed);
        consumer.deliver_frame(Frame::new(image, timestamp, frame_number, source));
        next_tick = timestamp + interval;
    }

    drop(device);
    log::debug!("Frame delivery thread exiting");
}
