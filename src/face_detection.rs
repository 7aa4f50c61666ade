//! Face location: a pluggable detector backend plus the selection policy
//! that reduces its candidates to at most one face per frame.

/// SCRFD detector running on ONNX Runtime
#[cfg(feature = "onnx")]
pub mod scrfd;

use crate::geometry::{Point, Rect};
use crate::source::Frame;
use crate::utils::clip_to_image;
use crate::validity::{DetectionMiss, Validity};
use crate::Result;
use log::{debug, warn};

/// Relative area difference under which two faces count as equally large
const AREA_TIE_TOLERANCE: f32 = 1e-3;

/// Raw detector output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceCandidate {
    /// Bounding box in frame pixels
    pub bbox: Rect,
    /// Detector confidence in [0, 1]
    pub score: f32,
}

impl FaceCandidate {
    #[must_use]
    pub fn new(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// The face selected for a frame, or the reason there is none
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    bbox: Rect,
    confidence: f32,
    frame_sequence: u64,
    validity: Validity,
}

impl FaceRegion {
    #[must_use]
    pub fn valid(bbox: Rect, confidence: f32, frame_sequence: u64) -> Self {
        Self {
            bbox,
            confidence,
            frame_sequence,
            validity: Validity::Valid,
        }
    }

    #[must_use]
    pub fn invalid(miss: DetectionMiss, frame_sequence: u64) -> Self {
        Self {
            bbox: Rect::default(),
            confidence: 0.0,
            frame_sequence,
            validity: Validity::Invalid(miss),
        }
    }

    #[must_use]
    pub fn bbox(&self) -> &Rect {
        &self.bbox
    }

    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Sequence index of the frame this region was found in
    #[must_use]
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    #[must_use]
    pub fn validity(&self) -> Validity {
        self.validity
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

/// Detection backend returning every face it sees
pub trait FaceDetector: Send {
    /// Detect faces in a frame
    ///
    /// # Errors
    ///
    /// Backend-specific inference failures
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceCandidate>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Backend reporting one fixed face rectangle, for rigs where the face
/// position is known in advance (head-mounted or kiosk cameras).
#[derive(Debug, Clone)]
pub struct StaticFaceDetector {
    region: Rect,
    score: f32,
}

impl StaticFaceDetector {
    #[must_use]
    pub fn new(region: Rect, score: f32) -> Self {
        Self { region, score }
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceCandidate>> {
        Ok(clip_to_image(&self.region, frame.width(), frame.height())
            .map(|bbox| FaceCandidate::new(bbox, self.score))
            .into_iter()
            .collect())
    }

    fn name(&self) -> &str {
        "StaticFaceDetector"
    }
}

/// Pick the face to track among detector candidates.
///
/// Candidates below `threshold` are discarded. Of the rest the largest box
/// wins (nearest to the camera); equal areas are decided by distance of the
/// box centre to the frame centre.
///
/// # Errors
///
/// [`DetectionMiss::NoFace`] without usable candidates,
/// [`DetectionMiss::LowConfidence`] when all scored below the threshold.
#[allow(clippy::cast_precision_loss)]
pub fn select_face(
    candidates: &[FaceCandidate],
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> std::result::Result<FaceCandidate, DetectionMiss> {
    let frame_center = Point::new(frame_width as f32 / 2.0, frame_height as f32 / 2.0);

    let usable: Vec<FaceCandidate> = candidates
        .iter()
        .filter(|c| c.score.is_finite() && c.bbox.x.is_finite() && c.bbox.y.is_finite())
        .filter_map(|c| {
            clip_to_image(&c.bbox, frame_width, frame_height).map(|bbox| FaceCandidate::new(bbox, c.score))
        })
        .collect();

    if usable.is_empty() {
        return Err(DetectionMiss::NoFace);
    }

    let confident: Vec<&FaceCandidate> = usable.iter().filter(|c| c.score >= threshold).collect();

    let mut best: Option<&FaceCandidate> = None;
    for candidate in confident {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let (a, b) = (candidate.bbox.area(), current.bbox.area());
                let tie = (a - b).abs() <= AREA_TIE_TOLERANCE * a.max(b);
                let closer = candidate.bbox.center().distance(&frame_center)
                    < current.bbox.center().distance(&frame_center);
                if (!tie && a > b) || (tie && closer) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.copied().ok_or(DetectionMiss::LowConfidence)
}

/// Applies the selection policy to a detector backend
pub struct FaceLocator {
    detector: Box<dyn FaceDetector>,
    threshold: f32,
}

impl FaceLocator {
    #[must_use]
    pub fn new(detector: Box<dyn FaceDetector>, threshold: f32) -> Self {
        Self { detector, threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Locate zero or one face in the frame.
    ///
    /// Backend failures are logged and reported as [`DetectionMiss::NoFace`].
    pub fn locate(&mut self, frame: &Frame) -> FaceRegion {
        let candidates = match self.detector.detect(frame) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("{} failed on frame {}: {}", self.detector.name(), frame.sequence(), e);
                return FaceRegion::invalid(DetectionMiss::NoFace, frame.sequence());
            }
        };

        match select_face(&candidates, frame.width(), frame.height(), self.threshold) {
            Ok(face) => FaceRegion::valid(face.bbox, face.score, frame.sequence()),
            Err(miss) => {
                debug!("Frame {}: {} ({} candidates)", frame.sequence(), miss, candidates.len());
                FaceRegion::invalid(miss, frame.sequence())
            }
        }
    }
}
