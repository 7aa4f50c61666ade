//! Tracking session: owns the capture device and the pipeline thread.
//!
//! The session moves through `Idle -> Running <-> Degraded -> Stopped`.
//! Frames are processed on a dedicated thread and each result is
//! published to a latest-value slot; consumers poll or wait on it and
//! never block the pipeline.

mod pipeline;
mod registry;

pub use pipeline::{FramePipeline, TrackingState};
pub use registry::{DeviceClaim, DeviceRegistry};

use crate::backend::{BackendFactory, ConfigBackendFactory};
use crate::blink::BlinkEvent;
use crate::config::Config;
use crate::dwell::DwellEvent;
use crate::gaze::GazeVector;
use crate::gesture::{MouthEvent, ScrollEvent};
use crate::geometry::{Point, Rect};
use crate::slot::{LatestSlot, SlotWait};
use crate::source::{DefaultProvider, DeviceId, FrameSource, SourceProvider};
use crate::validity::DetectionMiss;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle state of a [`TrackingSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, never started
    Idle,
    /// Processing frames with a valid gaze
    Running,
    /// Processing frames, but the latest one had no valid gaze
    Degraded,
    /// Capture ended, failed or was stopped
    Stopped,
}

impl SessionState {
    /// Whether the pipeline thread is alive in this state
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Everything the pipeline produced for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub sequence: u64,
    pub timestamp: Duration,
    pub state: SessionState,
    /// Whether this frame produced a fresh gaze
    pub valid: bool,
    /// Why this frame had no gaze: the first stage that gave up
    pub miss: Option<DetectionMiss>,
    /// Smoothed gaze; while degraded, the last valid one with decayed confidence
    pub gaze: Option<GazeVector>,
    pub confidence: f32,
    pub face: Option<Rect>,
    /// Pupil centres in frame coordinates
    pub left_pupil: Option<Point>,
    pub right_pupil: Option<Point>,
    pub blinks: Vec<BlinkEvent>,
    pub dwell: Option<DwellEvent>,
    pub dwell_progress: f32,
    pub mouth: Option<MouthEvent>,
    pub scrolls: Vec<ScrollEvent>,
    /// Whether the lip scroll mode is on
    pub scroll_mode: bool,
    pub fixating: bool,
    pub frames_processed: u64,
}

struct Status {
    state: SessionState,
    last_error: Option<Arc<Error>>,
}

struct Shared {
    status: Mutex<Status>,
    slot: LatestSlot<TrackingSnapshot>,
    stop: AtomicBool,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        let mut status = self.status();
        if status.state != state {
            debug!("Session {} -> {}", status.state, state);
            status.state = state;
        }
    }

    fn record_error(&self, err: Error) -> Arc<Error> {
        let err = Arc::new(err);
        self.status().last_error = Some(Arc::clone(&err));
        err
    }
}

/// A gaze tracking session on one capture device
pub struct TrackingSession {
    config: Config,
    backends: Arc<dyn BackendFactory>,
    sources: Arc<dyn SourceProvider>,
    registry: Arc<DeviceRegistry>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TrackingSession {
    /// Create an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration is invalid
    pub fn new(
        config: Config,
        backends: Arc<dyn BackendFactory>,
        sources: Arc<dyn SourceProvider>,
        registry: Arc<DeviceRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backends,
            sources,
            registry,
            shared: Arc::new(Shared {
                status: Mutex::new(Status {
                    state: SessionState::Idle,
                    last_error: None,
                }),
                slot: LatestSlot::new(),
                stop: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Session with the backend and device named in the configuration and
    /// a private device registry.
    ///
    /// The private registry only guards this session. Sessions that must
    /// exclude each other from a device need
    /// [`TrackingSession::from_config_with_registry`] with one shared registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration is invalid
    pub fn from_config(config: Config) -> Result<Self> {
        Self::from_config_with_registry(config, DeviceRegistry::new())
    }

    /// Like [`TrackingSession::from_config`], claiming devices in `registry`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration is invalid
    pub fn from_config_with_registry(config: Config, registry: Arc<DeviceRegistry>) -> Result<Self> {
        let backends = Arc::new(ConfigBackendFactory::new(config.detection.clone()));
        let sources = Arc::new(DefaultProvider {
            sequence_fps: config.session.sequence_fps,
        });
        Self::new(config, backends, sources, registry)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.config.device
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.status().state
    }

    /// The error that ended the last run or failed the last start
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.shared.status().last_error.clone()
    }

    /// Most recent snapshot; never blocks on the pipeline
    #[must_use]
    pub fn latest(&self) -> Option<TrackingSnapshot> {
        self.shared.slot.latest()
    }

    /// Receive snapshots published from now on
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            shared: Arc::clone(&self.shared),
            seen: self.shared.slot.version(),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the device and start the pipeline thread.
    ///
    /// A stopped session may be started again.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the session is already running
    /// - [`Error::DeviceBusy`] if another session holds the device
    /// - [`Error::DeviceUnavailable`] if the device cannot be opened
    /// - backend construction errors
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();

        let state = self.state();
        if state.is_active() {
            return Err(Error::InvalidState(format!("cannot start a {state} session")));
        }
        if let Some(finished) = worker.take() {
            join(finished);
        }

        let device = self.config.device.clone();
        info!("Starting gaze tracking on {device}");

        let prepared = self.prepare(&device);
        let (claim, source, pipeline) = match prepared {
            Ok(parts) => parts,
            Err(err) => {
                error!("Failed to start on {device}: {err}");
                let err = self.shared.record_error(err);
                return Err(clone_error(&err));
            }
        };

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.status().last_error = None;
        self.shared.set_state(SessionState::Running);

        let shared = Arc::clone(&self.shared);
        let timeout = self.config.session.frame_timeout();
        let handle = thread::Builder::new()
            .name("gaze-pipeline".to_string())
            .spawn(move || run(&shared, claim, source, pipeline, timeout));

        match handle {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(SessionState::Stopped);
                let err = self.shared.record_error(Error::Io(err));
                Err(clone_error(&err))
            }
        }
    }

    fn prepare(&self, device: &DeviceId) -> Result<(DeviceClaim, Box<dyn FrameSource>, FramePipeline)> {
        let claim = self.registry.claim(device)?;
        let source = self.sources.open(device)?;
        let backend = self.backends.create()?;
        let pipeline = FramePipeline::new(&self.config, backend)?;
        Ok((claim, source, pipeline))
    }

    /// Stop the pipeline thread and release the device.
    ///
    /// Returns once the device is released. Safe to call from several
    /// threads at once and on a session that is not running.
    pub fn stop(&self) {
        let mut worker = self.worker();
        let Some(handle) = worker.take() else {
            return;
        };
        info!("Stopping gaze tracking on {}", self.config.device);
        self.shared.stop.store(true, Ordering::SeqCst);
        join(handle);
        self.shared.set_state(SessionState::Stopped);
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
        self.shared.slot.close();
    }
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Pipeline thread panicked");
    }
}

// Errors are not Clone; rebuild the variant the caller needs to match on
fn clone_error(err: &Error) -> Error {
    match err {
        Error::DeviceUnavailable(msg) => Error::DeviceUnavailable(msg.clone()),
        Error::DeviceBusy(msg) => Error::DeviceBusy(msg.clone()),
        Error::FrameTimeout => Error::FrameTimeout,
        Error::CalibrationMissing => Error::CalibrationMissing,
        Error::Calibration(msg) => Error::Calibration(msg.clone()),
        Error::InvalidInput(msg) => Error::InvalidInput(msg.clone()),
        Error::ModelError(msg) => Error::ModelError(msg.clone()),
        Error::FilterError(msg) => Error::FilterError(msg.clone()),
        Error::ConfigError(msg) => Error::ConfigError(msg.clone()),
        Error::InvalidState(msg) => Error::InvalidState(msg.clone()),
        other => Error::InvalidInput(other.to_string()),
    }
}

fn run(
    shared: &Shared,
    claim: DeviceClaim,
    mut source: Box<dyn FrameSource>,
    mut pipeline: FramePipeline,
    timeout: Duration,
) {
    let device = claim.device().clone();
    debug!("Pipeline thread started on {device}");

    while !shared.stop.load(Ordering::SeqCst) {
        match source.next_frame(timeout) {
            Ok(Some(frame)) => {
                if let Some(snapshot) = pipeline.process(&frame) {
                    shared.set_state(snapshot.state);
                    shared.slot.publish(snapshot);
                }
            }
            Ok(None) => {
                info!("End of stream on {device}");
                break;
            }
            Err(Error::FrameTimeout) => {
                debug!("No frame from {device} within {timeout:?}");
            }
            Err(err) if err.is_fatal() => {
                error!("Capture failed on {device}: {err}");
                shared.record_error(err);
                break;
            }
            Err(err) => warn!("Skipping frame from {device}: {err}"),
        }
    }

    // Release the device before reporting Stopped
    drop(source);
    drop(claim);
    shared.set_state(SessionState::Stopped);
    shared.slot.publish(pipeline.stopped_snapshot());
    info!(
        "Pipeline on {device} stopped after {} frames",
        pipeline.tracking_state().frames_processed()
    );
}

/// Reader side of a session's snapshot stream.
///
/// A slow reader skips intermediate snapshots and always resumes at the
/// newest one.
pub struct Subscription {
    shared: Arc<Shared>,
    seen: u64,
}

impl Subscription {
    /// Wait up to `timeout` for a snapshot newer than the last one returned.
    ///
    /// Returns `None` on timeout or once the session is dropped.
    pub fn wait_next(&mut self, timeout: Duration) -> Option<TrackingSnapshot> {
        match self.shared.slot.wait_newer(self.seen, timeout) {
            SlotWait::Value(version, snapshot) => {
                self.seen = version;
                Some(snapshot)
            }
            SlotWait::Timeout | SlotWait::Closed => None,
        }
    }

    /// Newer snapshot if one is available; never blocks
    pub fn try_next(&mut self) -> Option<TrackingSnapshot> {
        let (version, snapshot) = self.shared.slot.newer_than(self.seen)?;
        self.seen = version;
        Some(snapshot)
    }

    /// Whether the session is gone and nothing newer remains
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.slot.is_closed() && self.shared.slot.version() == self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DetectorBackend;
    use crate::face_detection::StaticFaceDetector;
    use crate::mark_detection::MeanShapeLandmarker;
    use crate::source::{push, Frame};
    use image::GrayImage;

    fn backend() -> Result<DetectorBackend> {
        Ok(DetectorBackend::new(
            Box::new(StaticFaceDetector::new(Rect::new(0.0, 0.0, 64.0, 48.0), 1.0)),
            Box::new(MeanShapeLandmarker),
        ))
    }

    struct Silent(DeviceId);

    impl FrameSource for Silent {
        fn device(&self) -> &DeviceId {
            &self.0
        }

        fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
            thread::sleep(timeout);
            Err(Error::FrameTimeout)
        }
    }

    fn silent_session(registry: Arc<DeviceRegistry>) -> TrackingSession {
        let provider = |device: &DeviceId| -> Result<Box<dyn FrameSource>> { Ok(Box::new(Silent(device.clone()))) };
        let mut config = Config::default();
        config.session.frame_timeout_ms = 5;
        TrackingSession::new(config, Arc::new(backend), Arc::new(provider), registry).unwrap()
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let registry = DeviceRegistry::new();
        let session = silent_session(Arc::clone(&registry));
        assert_eq!(session.state(), SessionState::Idle);
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        assert!(session.state().is_active());
        assert!(registry.is_claimed(session.device()));
        assert!(matches!(session.start(), Err(Error::InvalidState(_))));

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!registry.is_claimed(session.device()));

        // Restart without DeviceBusy
        session.start().unwrap();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_second_session_on_claimed_device_is_busy() {
        let registry = DeviceRegistry::new();
        let first = silent_session(Arc::clone(&registry));
        let second = silent_session(Arc::clone(&registry));
        first.start().unwrap();

        assert!(matches!(second.start(), Err(Error::DeviceBusy(_))));
        assert!(matches!(second.last_error().as_deref(), Some(Error::DeviceBusy(_))));
        assert_eq!(second.state(), SessionState::Idle);

        first.stop();
        second.start().unwrap();
        second.stop();
    }

    #[test]
    fn test_disconnect_stops_with_device_unavailable() {
        let registry = DeviceRegistry::new();
        let (pusher, source) = push::channel(DeviceId::Index(0));
        let source = Mutex::new(Some(source));
        let provider = move |device: &DeviceId| -> Result<Box<dyn FrameSource>> {
            let taken = source.lock().unwrap().take();
            taken
                .map(|s| Box::new(s) as Box<dyn FrameSource>)
                .ok_or_else(|| Error::DeviceUnavailable(device.to_string()))
        };
        let session = TrackingSession::new(Config::default(), Arc::new(backend), Arc::new(provider), registry).unwrap();
        let mut updates = session.subscribe();
        session.start().unwrap();

        drop(pusher);
        let mut last = None;
        while let Some(snapshot) = updates.wait_next(Duration::from_secs(5)) {
            let stopped = snapshot.state == SessionState::Stopped;
            last = Some(snapshot);
            if stopped {
                break;
            }
        }
        assert_eq!(last.map(|s| s.state), Some(SessionState::Stopped));
        assert!(matches!(session.last_error().as_deref(), Some(Error::DeviceUnavailable(_))));

        // The source was consumed; a second open reports the device gone
        assert!(matches!(session.start(), Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn test_concurrent_stop() {
        let session = Arc::new(silent_session(DeviceRegistry::new()));
        session.start().unwrap();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.stop())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Degraded.to_string(), "degraded");
        assert!(!SessionState::Stopped.is_active());
    }
}
