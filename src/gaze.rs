//! Gaze direction from pupil positions within the eye openings.

use crate::calibration::CalibrationMap;
use crate::constants::{DEFAULT_MAX_PITCH_DEG, DEFAULT_MAX_YAW_DEG, DEFAULT_SINGLE_EYE_PENALTY};
use crate::eye_region::EyeRegion;
use crate::geometry::Point;
use crate::pupil::PupilEstimate;
use crate::validity::{DetectionMiss, Validity};
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Which eyes contributed to a gaze vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeSource {
    Both,
    LeftOnly,
    RightOnly,
    None,
}

/// Coarse gaze direction in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeDirection {
    Center,
    Left,
    Right,
    Up,
    Down,
}

/// Direction of gaze for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeVector {
    /// Pupil offset from the eye centre, each axis normalized to [-1, 1]
    /// by the eye half-extent (x grows right, y grows down)
    pub offset: Point,
    /// Unit direction `(x, y, z)` with `z` pointing away from the face
    pub direction: [f32; 3],
    /// Calibrated screen point, when a calibration is loaded
    pub screen: Option<Point>,
    pub confidence: f32,
    pub source: GazeSource,
    pub validity: Validity,
}

impl GazeVector {
    #[must_use]
    pub fn invalid(miss: DetectionMiss) -> Self {
        Self {
            offset: Point::default(),
            direction: [0.0, 0.0, 1.0],
            screen: None,
            confidence: 0.0,
            source: GazeSource::None,
            validity: Validity::Invalid(miss),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// Bucket the offset; within `threshold` on both axes counts as centre
    #[must_use]
    pub fn classify(&self, threshold: f32) -> GazeDirection {
        let Point { x, y } = self.offset;
        if x.abs() <= threshold && y.abs() <= threshold {
            GazeDirection::Center
        } else if x.abs() >= y.abs() {
            if x < 0.0 {
                GazeDirection::Left
            } else {
                GazeDirection::Right
            }
        } else if y < 0.0 {
            GazeDirection::Up
        } else {
            GazeDirection::Down
        }
    }
}

/// Gaze estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Horizontal angle reached at a normalized offset of 1
    pub max_yaw_deg: f32,
    /// Vertical angle reached at a normalized offset of 1
    pub max_pitch_deg: f32,
    /// Confidence multiplier when only one eye is usable
    pub single_eye_penalty: f32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            max_yaw_deg: DEFAULT_MAX_YAW_DEG,
            max_pitch_deg: DEFAULT_MAX_PITCH_DEG,
            single_eye_penalty: DEFAULT_SINGLE_EYE_PENALTY,
        }
    }
}

/// Normalized pupil offset within its eye opening
#[must_use]
pub fn eye_offset(eye: &EyeRegion, pupil: &PupilEstimate) -> Option<Point> {
    if !eye.is_valid() || !pupil.is_valid() {
        return None;
    }
    let geometry = eye.geometry();
    let p = pupil.position();
    Some(Point::new(
        ((p.x - geometry.center.x) / geometry.half_width).clamp(-1.0, 1.0),
        ((p.y - geometry.center.y) / geometry.half_height).clamp(-1.0, 1.0),
    ))
}

/// Combines both eyes into a gaze vector and maps it to the screen
#[derive(Debug, Clone, Default)]
pub struct GazeEstimator {
    config: GazeConfig,
    calibration: Option<CalibrationMap>,
}

impl GazeEstimator {
    #[must_use]
    pub fn new(config: GazeConfig, calibration: Option<CalibrationMap>) -> Self {
        Self { config, calibration }
    }

    #[must_use]
    pub fn calibration(&self) -> Option<&CalibrationMap> {
        self.calibration.as_ref()
    }

    pub fn set_calibration(&mut self, calibration: Option<CalibrationMap>) {
        self.calibration = calibration;
    }

    /// Gaze from both eyes, falling back to a single eye with reduced
    /// confidence. Invalid only when neither eye is usable.
    #[must_use]
    pub fn estimate(
        &self,
        left_eye: &EyeRegion,
        left: &PupilEstimate,
        right_eye: &EyeRegion,
        right: &PupilEstimate,
    ) -> GazeVector {
        let left_offset = eye_offset(left_eye, left);
        let right_offset = eye_offset(right_eye, right);

        let (offset, confidence, source) = match (left_offset, right_offset) {
            (Some(l), Some(r)) => (l.midpoint(&r), (left.confidence() + right.confidence()) / 2.0, GazeSource::Both),
            (Some(l), None) => (l, left.confidence() * self.config.single_eye_penalty, GazeSource::LeftOnly),
            (None, Some(r)) => (r, right.confidence() * self.config.single_eye_penalty, GazeSource::RightOnly),
            (None, None) => {
                let miss = if left_eye.is_valid() || right_eye.is_valid() {
                    DetectionMiss::BothEyesInvalid
                } else {
                    DetectionMiss::UpstreamInvalid
                };
                return GazeVector::invalid(miss);
            }
        };

        self.from_offset(offset, confidence, source)
    }

    /// Build a valid gaze vector from a (possibly smoothed) offset
    #[must_use]
    pub fn from_offset(&self, offset: Point, confidence: f32, source: GazeSource) -> GazeVector {
        let yaw = (offset.x * self.config.max_yaw_deg).to_radians();
        let pitch = (offset.y * self.config.max_pitch_deg).to_radians();
        let direction = [yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos()];

        let screen = match self.map_to_screen(&offset) {
            Ok(point) => Some(point),
            Err(e) => {
                debug!("Screen mapping skipped: {e}");
                None
            }
        };

        GazeVector {
            offset,
            direction,
            screen,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            validity: Validity::Valid,
        }
    }

    /// Calibrated screen point for a normalized offset
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationMissing`] without a calibration
    pub fn map_to_screen(&self, offset: &Point) -> Result<Point> {
        self.calibration
            .as_ref()
            .map(|map| map.apply(offset))
            .ok_or(Error::CalibrationMissing)
    }
}
