//! Configuration management for the gaze tracker

use crate::blink::BlinkConfig;
use crate::calibration::CalibrationMap;
use crate::constants::{
    DEFAULT_CONFIDENCE_DECAY, DEFAULT_DETECTION_THRESHOLD, DEFAULT_EXPONENTIAL_ALPHA, DEFAULT_EYE_MARGIN,
    DEFAULT_FIXATION_THRESHOLD, DEFAULT_FPS, DEFAULT_FRAME_TIMEOUT_MS, DEFAULT_SMOOTHING_WINDOW,
};
use crate::dwell::DwellConfig;
use crate::filters::{self, FilterKind, GazeFilter};
use crate::gaze::GazeConfig;
use crate::gesture::GestureConfig;
use crate::geometry::Rect;
use crate::pupil::PupilConfig;
use crate::source::DeviceId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tracker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture device: camera index, video URI or image directory
    pub device: DeviceId,

    /// Face and landmark detection
    pub detection: DetectionConfig,

    /// Pupil estimator tuning
    pub pupil: PupilConfig,

    /// Gaze geometry
    pub gaze: GazeConfig,

    /// Temporal smoothing
    pub smoothing: SmoothingConfig,

    /// Session behaviour
    pub session: SessionConfig,

    /// Blink detection
    pub blink: BlinkConfig,

    /// Dwell selection
    pub dwell: DwellConfig,

    /// Mouth clicks and brow or lip scrolling
    pub gesture: GestureConfig,

    /// Pre-fit screen mapping; gaze stays uncalibrated without one
    pub calibration: Option<CalibrationMap>,
}

/// Which detector implementations to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Fixed face region with mean-shape landmarks
    Static,
    /// SCRFD face detector and 68-point landmark regressor on ONNX Runtime
    Onnx,
}

/// Face and landmark detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub backend: BackendKind,

    /// Minimum face confidence (0.0-1.0)
    pub threshold: f32,

    /// IOU threshold for non-maximum suppression (0.0-1.0)
    pub nms_threshold: f32,

    /// Face rectangle for the static backend; whole frame when absent
    pub face_region: Option<Rect>,

    /// Score reported by the static backend
    pub static_score: f32,

    /// Path to the face detection ONNX model
    pub face_model: PathBuf,

    /// Path to the facial landmarks ONNX model
    pub landmark_model: PathBuf,

    /// Margin around each eye contour, as a fraction of eye width
    pub eye_margin: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Static,
            threshold: DEFAULT_DETECTION_THRESHOLD,
            nms_threshold: 0.4,
            face_region: None,
            static_score: 1.0,
            face_model: PathBuf::from("assets/face_detector.onnx"),
            landmark_model: PathBuf::from("assets/face_landmarks.onnx"),
            eye_margin: DEFAULT_EYE_MARGIN,
        }
    }
}

/// Smoothing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub filter: FilterKind,

    /// History length in frames, also the window of windowed filters
    pub window: usize,

    /// Exponential filter alpha value
    pub alpha: f64,

    /// Offset standard deviation below which gaze counts as a fixation
    pub fixation_threshold: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            filter: FilterKind::MovingAverage,
            window: DEFAULT_SMOOTHING_WINDOW,
            alpha: DEFAULT_EXPONENTIAL_ALPHA,
            fixation_threshold: DEFAULT_FIXATION_THRESHOLD,
        }
    }
}

impl SmoothingConfig {
    /// Create the configured filter
    ///
    /// # Errors
    ///
    /// Returns an error for invalid filter parameters
    pub fn create_filter(&self) -> Result<Box<dyn GazeFilter>> {
        filters::create_filter(self.filter, self.window, self.alpha)
    }
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Confidence multiplier per invalid frame while degraded, in (0, 1)
    pub confidence_decay: f32,

    /// Longest wait for a single frame before retrying
    pub frame_timeout_ms: u64,

    /// Nominal frame rate for image-directory devices
    pub sequence_fps: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confidence_decay: DEFAULT_CONFIDENCE_DECAY,
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            sequence_fps: DEFAULT_FPS,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            return Err(Error::ConfigError(
                "Detection threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.nms_threshold) {
            return Err(Error::ConfigError("NMS threshold must be between 0.0 and 1.0".to_string()));
        }
        if !(self.detection.eye_margin >= 0.0) {
            return Err(Error::ConfigError("Eye margin must not be negative".to_string()));
        }

        self.pupil.validate()?;

        if self.smoothing.window == 0 {
            return Err(Error::ConfigError(
                "Smoothing window size must be greater than 0".to_string(),
            ));
        }
        if !(self.smoothing.alpha > 0.0 && self.smoothing.alpha <= 1.0) {
            return Err(Error::ConfigError(
                "Exponential alpha must be in (0.0, 1.0]".to_string(),
            ));
        }

        // Strictly below one so confidence keeps falling while degraded
        if !(self.session.confidence_decay > 0.0 && self.session.confidence_decay < 1.0) {
            return Err(Error::ConfigError(
                "Confidence decay must be in (0.0, 1.0)".to_string(),
            ));
        }
        if self.session.frame_timeout_ms == 0 {
            return Err(Error::ConfigError("Frame timeout must be greater than 0".to_string()));
        }
        if !(self.session.sequence_fps > 0.0) {
            return Err(Error::ConfigError("Sequence FPS must be greater than 0".to_string()));
        }

        if self.blink.window == 0 {
            return Err(Error::ConfigError("Blink window must be greater than 0".to_string()));
        }
        if !(self.dwell.radius_px > 0.0) {
            return Err(Error::ConfigError("Dwell radius must be greater than 0".to_string()));
        }
        self.gesture.validate()?;

        if self.detection.backend == BackendKind::Onnx {
            if !self.detection.face_model.exists() {
                return Err(Error::ConfigError(format!(
                    "Face detector model not found: {}",
                    self.detection.face_model.display()
                )));
            }
            if !self.detection.landmark_model.exists() {
                return Err(Error::ConfigError(format!(
                    "Face landmarks model not found: {}",
                    self.detection.landmark_model.display()
                )));
            }
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Gaze Tracking Configuration

# Camera index, video URI or a directory of frames
device: 0

# Face and landmark detection
detection:
  backend: static          # static | onnx
  threshold: 0.6
  nms_threshold: 0.4
  face_region: null        # e.g. {x: 160, y: 80, width: 320, height: 320}
  static_score: 1.0
  face_model: "assets/face_detector.onnx"
  landmark_model: "assets/face_landmarks.onnx"
  eye_margin: 0.25

# Pupil estimator
pupil:
  closing_radius: 1
  threshold_ratio: 0.3
  min_contrast: 20
  min_blob_ratio: 0.01
  max_blob_ratio: 0.6
  min_blob_pixels: 4

# Gaze geometry
gaze:
  max_yaw_deg: 30.0
  max_pitch_deg: 20.0
  single_eye_penalty: 0.6

# Temporal smoothing
smoothing:
  filter: moving_average   # none | moving_average | exponential | median | kalman
  window: 5
  alpha: 0.5
  fixation_threshold: 0.05

# Session
session:
  confidence_decay: 0.85
  frame_timeout_ms: 500
  sequence_fps: 30.0

# Blink detection
blink:
  enabled: true
  window: 5
  left_threshold: 0.22
  right_threshold: 0.22
  min_consecutive_frames: 2
  cooldown_ms: 500

# Dwell selection (needs a calibration)
dwell:
  enabled: false
  radius_px: 45.0
  arm_delay_ms: 150
  dwell_time_ms: 1200
  cooldown_ms: 600

# Landmark gestures; events are reported, never injected
gesture:
  enabled: false
  mouth:
    enabled: true
    arm_ratio: 0.25
    close_ratio: 0.05
    cooldown_ms: 350
    double_click_window_ms: 1800
    right_click_hold_ms: 700
  brow:
    enabled: true
    up_threshold: 0.01
    down_threshold: 0.012
    window: 5
    baseline_alpha: 0.02
    repeat_ms: 90
  lip:
    enabled: true
    pucker_ratio: 0.62
    closed_ratio: 0.05
    toggle_hold_ms: 550
    repeat_ms: 100
    gaze_threshold: 0.2

# Screen mapping, for example:
# calibration:
#   model: affine
#   x: [960.0, 960.0, 0.0]
#   y: [540.0, 0.0, 540.0]
calibration: null
"#;
