//! Eye region extraction from a located face.
//!
//! Local eye coordinates follow the pixel-centre convention: pixel `(i, j)`
//! of the crop covers `[i, i + 1) x [j, j + 1)`, so its centre is at
//! `(i + 0.5, j + 0.5)`. Frame coordinates use the same convention.

use crate::constants::{DEFAULT_EYE_MARGIN, MIN_EYE_WIDTH_PX};
use crate::face_detection::FaceRegion;
use crate::geometry::{polygon_area, polygon_contains, Point, Rect};
use crate::mark_detection::{FaceLandmarks, LandmarkDetector};
use crate::source::Frame;
use crate::utils::image_ops::crop;
use crate::validity::{DetectionMiss, Validity};
use image::GrayImage;
use log::{debug, warn};

pub use crate::mark_detection::EyeSide;

/// Centre and half-extents of an eye opening, in local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeGeometry {
    pub center: Point,
    pub half_width: f32,
    pub half_height: f32,
}

/// A cropped eye with its opening contour
#[derive(Debug, Clone)]
pub struct EyeRegion {
    side: EyeSide,
    image: GrayImage,
    bounds: Rect,
    contour: [Point; 6],
    validity: Validity,
}

impl EyeRegion {
    /// Build a valid eye region from a crop, the frame rectangle it was
    /// taken from and the opening contour in crop coordinates.
    #[must_use]
    pub fn new(side: EyeSide, image: GrayImage, bounds: Rect, contour: [Point; 6]) -> Self {
        Self {
            side,
            image,
            bounds,
            contour,
            validity: Validity::Valid,
        }
    }

    #[must_use]
    pub fn invalid(side: EyeSide, miss: DetectionMiss) -> Self {
        Self {
            side,
            image: GrayImage::new(0, 0),
            bounds: Rect::default(),
            contour: [Point::default(); 6],
            validity: Validity::Invalid(miss),
        }
    }

    #[must_use]
    pub fn side(&self) -> EyeSide {
        self.side
    }

    /// Eye crop; empty for invalid regions
    #[must_use]
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Frame rectangle covered by the crop
    #[must_use]
    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    /// Eye-opening contour in crop coordinates
    #[must_use]
    pub fn contour(&self) -> &[Point; 6] {
        &self.contour
    }

    #[must_use]
    pub fn validity(&self) -> Validity {
        self.validity
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// Convert a crop coordinate to frame coordinates
    #[must_use]
    pub fn to_frame(&self, local: &Point) -> Point {
        local.offset(self.bounds.x, self.bounds.y)
    }

    /// Per-pixel membership of the eye opening, row-major over the crop
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn opening_mask(&self) -> Vec<bool> {
        let (w, h) = self.image.dimensions();
        let mut mask = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let centre = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                mask.push(polygon_contains(&self.contour, &centre));
            }
        }
        mask
    }

    /// Area of the eye opening in square pixels
    #[must_use]
    pub fn opening_area(&self) -> f32 {
        polygon_area(&self.contour)
    }

    /// Opening centre and half-extents.
    ///
    /// Horizontally the centre is the midpoint of the corners; vertically it
    /// is the mean of the four lid points.
    #[must_use]
    pub fn geometry(&self) -> EyeGeometry {
        let c = &self.contour;
        let upper = (c[1].y + c[2].y) / 2.0;
        let lower = (c[4].y + c[5].y) / 2.0;
        let center = Point::new((c[0].x + c[3].x) / 2.0, (upper + lower) / 2.0);
        EyeGeometry {
            center,
            half_width: (c[0].distance(&c[3]) / 2.0).max(f32::EPSILON),
            half_height: ((lower - upper).abs() / 2.0).max(f32::EPSILON),
        }
    }

    /// Eye aspect ratio (lid opening over corner distance)
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        eye_aspect_ratio(&self.contour)
    }
}

/// Eye aspect ratio of a six-point eye contour:
/// `(|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|)`.
#[must_use]
pub fn eye_aspect_ratio(contour: &[Point; 6]) -> f32 {
    let width = contour[0].distance(&contour[3]);
    if width <= f32::EPSILON {
        return 0.0;
    }
    (contour[1].distance(&contour[5]) + contour[2].distance(&contour[4])) / (2.0 * width)
}

/// Both eyes of one frame
#[derive(Debug, Clone)]
pub struct EyePair {
    pub left: EyeRegion,
    pub right: EyeRegion,
}

impl EyePair {
    #[must_use]
    pub fn invalid(miss: DetectionMiss) -> Self {
        Self {
            left: EyeRegion::invalid(EyeSide::Left, miss),
            right: EyeRegion::invalid(EyeSide::Right, miss),
        }
    }
}

/// Crops eye regions around landmark eye contours
pub struct EyeRegionExtractor {
    landmarks: Box<dyn LandmarkDetector>,
    margin: f32,
}

impl EyeRegionExtractor {
    /// `margin` is added on every side of the contour box, as a fraction of
    /// the eye width.
    #[must_use]
    pub fn new(landmarks: Box<dyn LandmarkDetector>, margin: f32) -> Self {
        Self { landmarks, margin }
    }

    #[must_use]
    pub fn with_default_margin(landmarks: Box<dyn LandmarkDetector>) -> Self {
        Self::new(landmarks, DEFAULT_EYE_MARGIN)
    }

    /// Extract both eyes of the face. Each eye is independently valid.
    pub fn extract(&mut self, frame: &Frame, face: &FaceRegion) -> EyePair {
        self.extract_with_marks(frame, face).0
    }

    /// Like [`EyeRegionExtractor::extract`], also returning the landmarks
    /// the eyes were cut from
    pub fn extract_with_marks(&mut self, frame: &Frame, face: &FaceRegion) -> (EyePair, Option<FaceLandmarks>) {
        if !face.is_valid() {
            return (EyePair::invalid(DetectionMiss::UpstreamInvalid), None);
        }
        match self.landmarks.detect(frame, face) {
            Ok(Some(landmarks)) => {
                let eyes = extract_with_landmarks(frame, face, &landmarks, self.margin);
                (eyes, Some(landmarks))
            }
            Ok(None) => {
                debug!("Frame {}: {} found no landmarks", frame.sequence(), self.landmarks.name());
                (EyePair::invalid(DetectionMiss::NoLandmarks), None)
            }
            Err(e) => {
                warn!("{} failed on frame {}: {}", self.landmarks.name(), frame.sequence(), e);
                (EyePair::invalid(DetectionMiss::NoLandmarks), None)
            }
        }
    }
}

/// Extract both eyes from already computed landmarks
#[must_use]
pub fn extract_with_landmarks(frame: &Frame, face: &FaceRegion, landmarks: &FaceLandmarks, margin: f32) -> EyePair {
    if !face.is_valid() {
        return EyePair::invalid(DetectionMiss::UpstreamInvalid);
    }
    EyePair {
        left: extract_eye(frame, face, landmarks, EyeSide::Left, margin),
        right: extract_eye(frame, face, landmarks, EyeSide::Right, margin),
    }
}

fn extract_eye(frame: &Frame, face: &FaceRegion, landmarks: &FaceLandmarks, side: EyeSide, margin: f32) -> EyeRegion {
    let contour = landmarks.eye_contour(side);
    if contour.iter().any(|p| !p.is_finite()) {
        return EyeRegion::invalid(side, DetectionMiss::EyeOccluded);
    }

    let width = contour[0].distance(&contour[3]);
    if width < MIN_EYE_WIDTH_PX {
        return EyeRegion::invalid(side, DetectionMiss::EyeOccluded);
    }

    let Some(contour_box) = Rect::bounding(&contour) else {
        return EyeRegion::invalid(side, DetectionMiss::EyeOccluded);
    };
    let pad = width * margin;
    let padded = contour_box.expand(pad, pad);
    if !face.bbox().contains_rect(&padded) {
        return EyeRegion::invalid(side, DetectionMiss::EyeOutsideFace);
    }
    // Whole pixels, never past a fractional face edge
    let region = padded.to_pixel_bounds().intersect(&face.bbox().to_inner_pixel_bounds());

    let Some((image, bounds)) = crop(frame.image(), &region) else {
        return EyeRegion::invalid(side, DetectionMiss::EyeOutsideFace);
    };
    let local = contour.map(|p| p.offset(-bounds.x, -bounds.y));
    EyeRegion::new(side, image, bounds, local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark_detection::{mean_shape_in, MeanShapeLandmarker};
    use std::time::Duration;

    fn frame() -> Frame {
        Frame::new(GrayImage::new(640, 480), Duration::ZERO, 3)
    }

    #[test]
    fn test_extract_both_eyes_inside_face() {
        let face = FaceRegion::valid(Rect::new(170.0, 90.0, 300.0, 300.0), 0.9, 3);
        let mut extractor = EyeRegionExtractor::with_default_margin(Box::new(MeanShapeLandmarker));
        let eyes = extractor.extract(&frame(), &face);

        for eye in [&eyes.left, &eyes.right] {
            assert!(eye.is_valid());
            assert!(face.bbox().contains_rect(eye.bounds()));
            assert_eq!(eye.image().width() as f32, eye.bounds().width);
            // Contour must be inside the crop with room to spare
            for p in eye.contour() {
                assert!(p.x > 0.0 && p.y > 0.0);
                assert!(p.x < eye.bounds().width && p.y < eye.bounds().height);
            }
        }
        assert_eq!(eyes.left.side(), EyeSide::Left);
        assert!(eyes.left.bounds().x < eyes.right.bounds().x);
    }

    #[test]
    fn test_invalid_face_propagates() {
        let face = FaceRegion::invalid(DetectionMiss::NoFace, 3);
        let mut extractor = EyeRegionExtractor::with_default_margin(Box::new(MeanShapeLandmarker));
        let eyes = extractor.extract(&frame(), &face);
        assert_eq!(eyes.left.validity(), Validity::Invalid(DetectionMiss::UpstreamInvalid));
        assert_eq!(eyes.right.validity(), Validity::Invalid(DetectionMiss::UpstreamInvalid));
    }

    #[test]
    fn test_eye_outside_face_is_invalid() {
        let face = FaceRegion::valid(Rect::new(170.0, 90.0, 300.0, 300.0), 0.9, 3);
        let mut points = mean_shape_in(face.bbox());
        // Shift the right eye past the face box edge
        for p in &mut points[42..48] {
            p.x += 200.0;
        }
        let landmarks = FaceLandmarks::new(points).unwrap();
        let eyes = extract_with_landmarks(&frame(), &face, &landmarks, DEFAULT_EYE_MARGIN);
        assert!(eyes.left.is_valid());
        assert_eq!(eyes.right.validity(), Validity::Invalid(DetectionMiss::EyeOutsideFace));
    }

    // Slide one eye so its padded box starts `gap` pixels inside the face's left edge
    fn eye_at_left_edge(face: &FaceRegion, gap: f32) -> FaceLandmarks {
        let mut points = mean_shape_in(face.bbox());
        let contour = &points[36..42];
        let pad = contour[0].distance(&contour[3]) * DEFAULT_EYE_MARGIN;
        let left = Rect::bounding(contour).unwrap().x - pad;
        let dx = face.bbox().x + gap - left;
        for p in &mut points[36..42] {
            p.x += dx;
        }
        FaceLandmarks::new(points).unwrap()
    }

    #[test]
    fn test_fractional_face_box_contains_its_eyes() {
        let face = FaceRegion::valid(Rect::new(170.6, 90.4, 300.0, 300.0), 0.9, 3);
        let landmarks = eye_at_left_edge(&face, 0.1);
        let eyes = extract_with_landmarks(&frame(), &face, &landmarks, DEFAULT_EYE_MARGIN);

        for eye in [&eyes.left, &eyes.right] {
            assert!(eye.is_valid());
            assert!(face.bbox().contains_rect(eye.bounds()), "{:?} escapes {:?}", eye.bounds(), face.bbox());
            assert_eq!(eye.bounds().x.fract(), 0.0);
            assert_eq!(eye.image().width() as f32, eye.bounds().width);
        }
        assert_eq!(eyes.left.bounds().x, 171.0);
    }

    #[test]
    fn test_eye_past_fractional_face_edge_is_invalid() {
        let face = FaceRegion::valid(Rect::new(170.6, 90.0, 300.0, 300.0), 0.9, 3);
        // Snapping both boxes outward would hide this overlap
        let landmarks = eye_at_left_edge(&face, -0.3);
        let eyes = extract_with_landmarks(&frame(), &face, &landmarks, DEFAULT_EYE_MARGIN);
        assert_eq!(eyes.left.validity(), Validity::Invalid(DetectionMiss::EyeOutsideFace));
        assert!(eyes.right.is_valid());
        assert!(face.bbox().contains_rect(eyes.right.bounds()));
    }

    #[test]
    fn test_profile_eye_is_occluded() {
        let face = FaceRegion::valid(Rect::new(170.0, 90.0, 300.0, 300.0), 0.9, 3);
        let mut points = mean_shape_in(face.bbox());
        // Collapse the left eye to a sliver as in a profile view
        let anchor = points[36];
        for p in &mut points[36..42] {
            p.x = anchor.x + (p.x - anchor.x) * 0.05;
        }
        let landmarks = FaceLandmarks::new(points).unwrap();
        let eyes = extract_with_landmarks(&frame(), &face, &landmarks, DEFAULT_EYE_MARGIN);
        assert_eq!(eyes.left.validity(), Validity::Invalid(DetectionMiss::EyeOccluded));
        assert!(eyes.right.is_valid());
    }

    #[test]
    fn test_geometry_and_aspect_ratio() {
        let contour = [
            Point::new(0.0, 5.0),
            Point::new(3.0, 3.0),
            Point::new(7.0, 3.0),
            Point::new(10.0, 5.0),
            Point::new(7.0, 7.0),
            Point::new(3.0, 7.0),
        ];
        let eye = EyeRegion::new(EyeSide::Left, GrayImage::new(10, 10), Rect::new(20.0, 30.0, 10.0, 10.0), contour);
        let geometry = eye.geometry();
        assert_eq!(geometry.center, Point::new(5.0, 5.0));
        assert_eq!(geometry.half_width, 5.0);
        assert_eq!(geometry.half_height, 2.0);
        assert!((eye.aspect_ratio() - 0.4).abs() < 1e-6);
        assert_eq!(eye.to_frame(&Point::new(1.0, 2.0)), Point::new(21.0, 32.0));

        let mask = eye.opening_mask();
        assert!(mask[5 * 10 + 5]);
        assert!(!mask[0]);
    }
}
