//! Facial landmark backends and the 68-point landmark set.
//!
//! Point layout follows the iBUG 68-point annotation:
//! jaw 0-16, brows 17-26, nose 27-35, eyes 36-47, mouth 48-67.
//! Each eye contour is listed clockwise starting at the outer corner:
//! corner, two upper lid points, corner, two lower lid points.

/// 68-point landmark regressor running on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::constants::{LEFT_EYE_LANDMARKS, NUM_FACIAL_LANDMARKS, RIGHT_EYE_LANDMARKS};
use crate::face_detection::FaceRegion;
use crate::geometry::{Point, Rect};
use crate::source::Frame;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which eye, as seen in the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeSide {
    /// The eye on the image's left (the subject's right eye)
    Left,
    /// The eye on the image's right (the subject's left eye)
    Right,
}

impl EyeSide {
    /// Landmark indices of this eye's contour
    #[must_use]
    pub fn landmark_range(self) -> std::ops::Range<usize> {
        match self {
            Self::Left => LEFT_EYE_LANDMARKS,
            Self::Right => RIGHT_EYE_LANDMARKS,
        }
    }
}

/// Face landmarks in frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    /// Wrap a 68-point landmark set
    ///
    /// # Errors
    ///
    /// Returns an error for any other number of points
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() != NUM_FACIAL_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected {NUM_FACIAL_LANDMARKS} landmarks, got {}",
                points.len()
            )));
        }
        Ok(Self { points })
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The six contour points of one eye
    #[must_use]
    pub fn eye_contour(&self, side: EyeSide) -> [Point; 6] {
        let range = side.landmark_range();
        let mut contour = [Point::default(); 6];
        contour.copy_from_slice(&self.points[range]);
        contour
    }
}

/// Landmark backend
pub trait LandmarkDetector: Send {
    /// Landmarks for the located face, `None` if the backend finds none
    ///
    /// # Errors
    ///
    /// Backend-specific inference failures
    fn detect(&mut self, frame: &Frame, face: &FaceRegion) -> Result<Option<FaceLandmarks>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Mean 68-point face shape, normalized to the face bounding box
pub const MEAN_FACE_SHAPE: [(f32, f32); NUM_FACIAL_LANDMARKS] = [
    (0.079, 0.339), (0.083, 0.457), (0.097, 0.576), (0.122, 0.692), (0.169, 0.800),
    (0.240, 0.896), (0.326, 0.977), (0.422, 1.043), (0.532, 1.061), (0.641, 1.040),
    (0.738, 0.972), (0.824, 0.890), (0.895, 0.792), (0.939, 0.682), (0.961, 0.562),
    (0.971, 0.442), (0.971, 0.322), (0.164, 0.249), (0.218, 0.204), (0.291, 0.192),
    (0.367, 0.204), (0.439, 0.233), (0.586, 0.228), (0.660, 0.196), (0.737, 0.182),
    (0.813, 0.193), (0.871, 0.235), (0.515, 0.319), (0.516, 0.396), (0.517, 0.474),
    (0.518, 0.553), (0.434, 0.604), (0.476, 0.621), (0.521, 0.634), (0.566, 0.619),
    (0.607, 0.602), (0.252, 0.331), (0.299, 0.303), (0.356, 0.303), (0.404, 0.339),
    (0.353, 0.350), (0.297, 0.350), (0.631, 0.334), (0.679, 0.296), (0.736, 0.295),
    (0.783, 0.321), (0.740, 0.342), (0.685, 0.344), (0.353, 0.746), (0.415, 0.719),
    (0.478, 0.707), (0.523, 0.717), (0.570, 0.705), (0.635, 0.716), (0.700, 0.739),
    (0.639, 0.805), (0.576, 0.835), (0.525, 0.842), (0.476, 0.838), (0.414, 0.810),
    (0.380, 0.750), (0.478, 0.745), (0.523, 0.749), (0.571, 0.743), (0.672, 0.744),
    (0.573, 0.777), (0.524, 0.783), (0.478, 0.778),
];

/// Place the mean face shape inside a face bounding box
#[must_use]
pub fn mean_shape_in(bbox: &Rect) -> Vec<Point> {
    MEAN_FACE_SHAPE
        .iter()
        .map(|&(u, v)| Point::new(bbox.x + u * bbox.width, bbox.y + v * bbox.height))
        .collect()
}

/// Landmark backend that places the mean face shape in the face box.
///
/// Adequate when faces are frontal and the detector box is tight; it
/// cannot see eyelid motion, so blink detection needs a real regressor.
#[derive(Debug, Clone, Default)]
pub struct MeanShapeLandmarker;

impl LandmarkDetector for MeanShapeLandmarker {
    fn detect(&mut self, _frame: &Frame, face: &FaceRegion) -> Result<Option<FaceLandmarks>> {
        if !face.is_valid() {
            return Ok(None);
        }
        FaceLandmarks::new(mean_shape_in(face.bbox())).map(Some)
    }

    fn name(&self) -> &str {
        "MeanShapeLandmarker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validity::DetectionMiss;
    use image::GrayImage;
    use std::time::Duration;

    #[test]
    fn test_landmark_count_enforced() {
        assert!(FaceLandmarks::new(vec![Point::default(); 5]).is_err());
        assert!(FaceLandmarks::new(vec![Point::default(); NUM_FACIAL_LANDMARKS]).is_ok());
    }

    #[test]
    fn test_eye_contours_from_mean_shape() {
        let landmarks = FaceLandmarks::new(mean_shape_in(&Rect::new(100.0, 50.0, 200.0, 200.0))).unwrap();
        let left = landmarks.eye_contour(EyeSide::Left);
        let right = landmarks.eye_contour(EyeSide::Right);

        // Left eye sits on the image's left, corners roughly level
        assert!(left[3].x < right[0].x);
        assert!((left[0].y - left[3].y).abs() < 5.0);
        // Upper lid above lower lid
        assert!(left[1].y < left[5].y);
        assert!(right[2].y < right[4].y);
    }

    #[test]
    fn test_mean_shape_skips_invalid_face() {
        let frame = Frame::new(GrayImage::new(10, 10), Duration::ZERO, 0);
        let face = FaceRegion::invalid(DetectionMiss::NoFace, 0);
        assert!(MeanShapeLandmarker.detect(&frame, &face).unwrap().is_none());
    }
}
