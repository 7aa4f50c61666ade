use super::{SessionState, TrackingSnapshot};
use crate::backend::DetectorBackend;
use crate::blink::BlinkDetector;
use crate::config::Config;
use crate::dwell::DwellDetector;
use crate::eye_region::{EyePair, EyeRegionExtractor};
use crate::face_detection::{FaceLocator, FaceRegion};
use crate::filters::GazeFilter;
use crate::gaze::{GazeEstimator, GazeVector};
use crate::gesture::{GestureDetector, GestureFrame};
use crate::geometry::Point;
use crate::history::GazeHistory;
use crate::pupil::{PupilEstimate, PupilEstimator};
use crate::source::Frame;
use crate::validity::DetectionMiss;
use crate::Result;
use log::{debug, warn};
use std::time::Duration;

/// Cross-frame state: smoothing filter, bounded history and the last
/// valid result used while degraded.
pub struct TrackingState {
    filter: Box<dyn GazeFilter>,
    history: GazeHistory,
    confidence_decay: f32,
    last_valid: Option<GazeVector>,
    current: Option<GazeVector>,
    frames_processed: u64,
    consecutive_invalid: u64,
}

impl TrackingState {
    #[must_use]
    pub fn new(filter: Box<dyn GazeFilter>, history: GazeHistory, confidence_decay: f32) -> Self {
        Self {
            filter,
            history,
            confidence_decay,
            last_valid: None,
            current: None,
            frames_processed: 0,
            consecutive_invalid: 0,
        }
    }

    /// Fold in one frame's raw gaze.
    ///
    /// A valid vector is smoothed and becomes the output. An invalid one
    /// repeats the previous output with its confidence decayed; `None`
    /// until the first valid frame.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update(&mut self, raw: &GazeVector, estimator: &GazeEstimator) -> Option<GazeVector> {
        self.frames_processed += 1;

        if raw.is_valid() {
            let (x, y) = self.filter.apply(f64::from(raw.offset.x), f64::from(raw.offset.y));
            let smoothed = estimator.from_offset(Point::new(x as f32, y as f32), raw.confidence, raw.source);
            self.history.push(smoothed.offset);
            self.last_valid = Some(smoothed);
            self.current = Some(smoothed);
            self.consecutive_invalid = 0;
            return self.current;
        }

        self.consecutive_invalid += 1;
        if let Some(current) = self.current.as_mut() {
            current.confidence *= self.confidence_decay;
        }
        self.current
    }

    /// Last smoothed valid vector, without decay
    #[must_use]
    pub fn last_valid(&self) -> Option<&GazeVector> {
        self.last_valid.as_ref()
    }

    /// Most recent output, decayed while degraded
    #[must_use]
    pub fn current(&self) -> Option<&GazeVector> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &GazeHistory {
        &self.history
    }

    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Invalid frames since the last valid one
    #[must_use]
    pub fn consecutive_invalid(&self) -> u64 {
        self.consecutive_invalid
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.history.clear();
        self.last_valid = None;
        self.current = None;
        self.frames_processed = 0;
        self.consecutive_invalid = 0;
    }
}

/// The per-frame stage chain with its tracking state.
///
/// Runs synchronously; [`super::TrackingSession`] drives it from its
/// pipeline thread.
pub struct FramePipeline {
    locator: FaceLocator,
    extractor: EyeRegionExtractor,
    pupils: PupilEstimator,
    gaze: GazeEstimator,
    state: TrackingState,
    blinks: Option<BlinkDetector>,
    dwell: Option<DwellDetector>,
    gestures: Option<GestureDetector>,
    last_frame: Option<(u64, Duration)>,
}

impl FramePipeline {
    /// # Errors
    ///
    /// Returns an error for invalid smoothing parameters
    pub fn new(config: &Config, backend: DetectorBackend) -> Result<Self> {
        let filter = config.smoothing.create_filter()?;
        debug!("Smoothing with {} over {} frames", filter.name(), config.smoothing.window);

        Ok(Self {
            locator: FaceLocator::new(backend.face, config.detection.threshold),
            extractor: EyeRegionExtractor::new(backend.landmarks, config.detection.eye_margin),
            pupils: PupilEstimator::new(config.pupil.clone()),
            gaze: GazeEstimator::new(config.gaze.clone(), config.calibration.clone()),
            state: TrackingState::new(
                filter,
                GazeHistory::new(config.smoothing.window, config.smoothing.fixation_threshold),
                config.session.confidence_decay,
            ),
            blinks: config.blink.enabled.then(|| BlinkDetector::new(&config.blink)),
            dwell: config.dwell.enabled.then(|| DwellDetector::new(&config.dwell)),
            gestures: config.gesture.enabled.then(|| GestureDetector::new(&config.gesture)),
            last_frame: None,
        })
    }

    #[must_use]
    pub fn tracking_state(&self) -> &TrackingState {
        &self.state
    }

    #[must_use]
    pub fn gaze_estimator(&self) -> &GazeEstimator {
        &self.gaze
    }

    /// Run all stages on one frame.
    ///
    /// Returns `None` for a frame that does not advance the sequence or
    /// the timestamp; such frames are dropped without touching the state.
    pub fn process(&mut self, frame: &Frame) -> Option<TrackingSnapshot> {
        if let Some((sequence, timestamp)) = self.last_frame {
            if frame.sequence() <= sequence || frame.timestamp() <= timestamp {
                warn!(
                    "Dropping out-of-order frame {} ({:?}) after frame {} ({:?})",
                    frame.sequence(),
                    frame.timestamp(),
                    sequence,
                    timestamp
                );
                return None;
            }
        }
        self.last_frame = Some((frame.sequence(), frame.timestamp()));

        let face = self.locator.locate(frame);
        let (eyes, landmarks) = self.extractor.extract_with_marks(frame, &face);
        let left = self.pupils.estimate(&eyes.left);
        let right = self.pupils.estimate(&eyes.right);
        let raw = self.gaze.estimate(&eyes.left, &left, &eyes.right, &right);

        let blinks = match self.blinks.as_mut() {
            Some(detector) => detector.update(
                eyes.left.is_valid().then(|| eyes.left.aspect_ratio()),
                eyes.right.is_valid().then(|| eyes.right.aspect_ratio()),
                frame.timestamp(),
            ),
            None => Vec::new(),
        };

        let output = self.state.update(&raw, &self.gaze);

        let (dwell, dwell_progress) = match self.dwell.as_mut() {
            Some(detector) => match output.and_then(|g| g.screen).filter(|_| raw.is_valid()) {
                Some(point) => {
                    let event = detector.update(point, frame.timestamp());
                    (event, detector.progress())
                }
                None => {
                    detector.reset();
                    (None, 0.0)
                }
            },
            None => (None, 0.0),
        };

        let gestures = match (self.gestures.as_mut(), landmarks.as_ref()) {
            (Some(detector), Some(landmarks)) => {
                let gaze_y = output.filter(|_| raw.is_valid()).map(|g| g.offset.y);
                detector.update(landmarks, gaze_y, frame.timestamp())
            }
            _ => GestureFrame::default(),
        };

        let valid = raw.is_valid();
        let miss = raw.validity.miss().map(|miss| match miss {
            DetectionMiss::UpstreamInvalid => root_cause(&face, &eyes).unwrap_or(miss),
            other => other,
        });
        if let Some(miss) = miss {
            debug!("Frame {}: no gaze ({miss})", frame.sequence());
        }
        let pupil_point = |p: &PupilEstimate| p.is_valid().then(|| p.frame_position());

        Some(TrackingSnapshot {
            sequence: frame.sequence(),
            timestamp: frame.timestamp(),
            state: if valid { SessionState::Running } else { SessionState::Degraded },
            valid,
            miss,
            gaze: output,
            confidence: output.map_or(0.0, |g| g.confidence),
            face: face.is_valid().then(|| *face.bbox()),
            left_pupil: pupil_point(&left),
            right_pupil: pupil_point(&right),
            blinks,
            dwell,
            dwell_progress,
            mouth: gestures.mouth,
            scrolls: gestures.scrolls,
            scroll_mode: self.gestures.as_ref().is_some_and(GestureDetector::scroll_mode),
            fixating: valid && self.state.history().is_fixating(),
            frames_processed: self.state.frames_processed(),
        })
    }

    /// Snapshot announcing the end of the session
    #[must_use]
    pub fn stopped_snapshot(&self) -> TrackingSnapshot {
        let (sequence, timestamp) = self.last_frame.unwrap_or((0, Duration::ZERO));
        let gaze = self.state.current().copied();
        TrackingSnapshot {
            sequence,
            timestamp,
            state: SessionState::Stopped,
            valid: false,
            miss: None,
            gaze,
            confidence: gaze.map_or(0.0, |g| g.confidence),
            face: None,
            left_pupil: None,
            right_pupil: None,
            blinks: Vec::new(),
            dwell: None,
            dwell_progress: 0.0,
            mouth: None,
            scrolls: Vec::new(),
            scroll_mode: false,
            fixating: false,
            frames_processed: self.state.frames_processed(),
        }
    }
}

// First stage that gave up, skipping stages that only propagated
fn root_cause(face: &FaceRegion, eyes: &EyePair) -> Option<DetectionMiss> {
    [face.validity(), eyes.left.validity(), eyes.right.validity()]
        .into_iter()
        .filter_map(|v| v.miss())
        .find(|miss| *miss != DetectionMiss::UpstreamInvalid)
}
