//! Pupil centre estimation inside an eye region.
//!
//! The estimator is stateless: the same eye crop always yields the same
//! estimate, so it can be checked frame by frame.
//!
//! Steps, all restricted to the pixels inside the eye-opening contour:
//!
//! 1. Contrast stretch between the 1st and 99th intensity percentiles.
//! 2. Grey closing to erase eyelashes and other thin dark structures.
//! 3. Threshold at `threshold_ratio` of the stretched range.
//! 4. Label 8-connected dark components; keep the darkest (ties: larger).
//! 5. Reject implausible areas, return the component centroid.

use crate::constants::{
    DEFAULT_CLOSING_RADIUS, DEFAULT_MAX_BLOB_RATIO, DEFAULT_MIN_BLOB_PIXELS, DEFAULT_MIN_BLOB_RATIO,
    DEFAULT_MIN_CONTRAST, DEFAULT_THRESHOLD_RATIO, STRETCH_HIGH_PERCENTILE, STRETCH_LOW_PERCENTILE,
};
use crate::eye_region::{EyeRegion, EyeSide};
use crate::geometry::Point;
use crate::utils::image_ops::{close, histogram_percentile, masked_histogram, stretch_image};
use crate::utils::safe_cast::count_to_f32;
use crate::validity::{DetectionMiss, Validity};
use crate::{Error, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Mean intensities closer than this count as equally dark
const MEAN_TIE_TOLERANCE: f32 = 1e-3;

/// Raw intensity spread at which the contrast factor saturates
const FULL_CONTRAST_SPREAD: f32 = 128.0;

/// Tuning of the pupil estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilConfig {
    /// Radius of the square closing window (0 disables closing)
    pub closing_radius: u32,
    /// Fraction of the stretched range counted as dark
    pub threshold_ratio: f32,
    /// Minimum raw intensity spread inside the eye opening
    pub min_contrast: u8,
    /// Smallest plausible pupil area as a fraction of the opening area
    pub min_blob_ratio: f32,
    /// Largest plausible pupil area as a fraction of the opening area
    pub max_blob_ratio: f32,
    /// Smallest plausible pupil area in pixels
    pub min_blob_pixels: usize,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            closing_radius: DEFAULT_CLOSING_RADIUS,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            min_contrast: DEFAULT_MIN_CONTRAST,
            min_blob_ratio: DEFAULT_MIN_BLOB_RATIO,
            max_blob_ratio: DEFAULT_MAX_BLOB_RATIO,
            min_blob_pixels: DEFAULT_MIN_BLOB_PIXELS,
        }
    }
}

impl PupilConfig {
    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range parameter
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_ratio > 0.0 && self.threshold_ratio < 1.0) {
            return Err(Error::ConfigError(format!(
                "pupil.threshold_ratio must be in (0, 1), got {}",
                self.threshold_ratio
            )));
        }
        if !(self.min_blob_ratio >= 0.0 && self.min_blob_ratio < self.max_blob_ratio && self.max_blob_ratio <= 1.0) {
            return Err(Error::ConfigError(format!(
                "pupil blob ratios must satisfy 0 <= min < max <= 1, got {} / {}",
                self.min_blob_ratio, self.max_blob_ratio
            )));
        }
        Ok(())
    }
}

/// Sub-pixel pupil centre in eye-region coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilEstimate {
    side: EyeSide,
    position: Point,
    frame_position: Point,
    confidence: f32,
    area: usize,
    validity: Validity,
}

impl PupilEstimate {
    #[must_use]
    pub fn invalid(side: EyeSide, miss: DetectionMiss) -> Self {
        Self {
            side,
            position: Point::default(),
            frame_position: Point::default(),
            confidence: 0.0,
            area: 0,
            validity: Validity::Invalid(miss),
        }
    }

    #[must_use]
    pub fn side(&self) -> EyeSide {
        self.side
    }

    /// Centre in eye-region coordinates, inside the region bounds
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Centre in frame coordinates
    #[must_use]
    pub fn frame_position(&self) -> Point {
        self.frame_position
    }

    /// Quality in [0, 1]
    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Pixel count of the selected dark component
    #[must_use]
    pub fn area(&self) -> usize {
        self.area
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

/// A connected dark component
#[derive(Debug, Clone, Copy, Default)]
struct Blob {
    count: usize,
    sum_x: f64,
    sum_y: f64,
    sum_intensity: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Blob {
    #[allow(clippy::cast_possible_truncation)]
    fn mean_intensity(&self) -> f32 {
        (self.sum_intensity / self.count as f64) as f32
    }

    /// Pixel-centre centroid
    #[allow(clippy::cast_possible_truncation)]
    fn centroid(&self) -> Point {
        let n = self.count as f64;
        Point::new((self.sum_x / n + 0.5) as f32, (self.sum_y / n + 0.5) as f32)
    }

    /// Area over bounding-box area, normalized so a disk scores about 1
    fn fill(&self) -> f32 {
        let box_area = (self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1);
        let ratio = count_to_f32(self.count) / count_to_f32(box_area as usize);
        (ratio / std::f32::consts::FRAC_PI_4).min(1.0)
    }
}

/// Label 8-connected components of `dark` (row-major, `width` columns)
#[allow(clippy::cast_possible_truncation)]
fn label_components(dark: &[bool], intensity: &GrayImage) -> Vec<Blob> {
    let (w, h) = intensity.dimensions();
    let mut visited = vec![false; dark.len()];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..dark.len() {
        if !dark[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut blob = Blob {
            min_x: u32::MAX,
            min_y: u32::MAX,
            ..Blob::default()
        };

        while let Some(idx) = stack.pop() {
            let (x, y) = ((idx as u32) % w, (idx as u32) / w);
            blob.count += 1;
            blob.sum_x += f64::from(x);
            blob.sum_y += f64::from(y);
            blob.sum_intensity += f64::from(intensity.get_pixel(x, y)[0]);
            blob.min_x = blob.min_x.min(x);
            blob.min_y = blob.min_y.min(y);
            blob.max_x = blob.max_x.max(x);
            blob.max_y = blob.max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = (ny * w + nx) as usize;
                    if dark[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        blobs.push(blob);
    }
    blobs
}

/// Locates the pupil as the darkest blob inside the eye opening
#[derive(Debug, Clone, Default)]
pub struct PupilEstimator {
    config: PupilConfig,
}

impl PupilEstimator {
    #[must_use]
    pub fn new(config: PupilConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PupilConfig {
        &self.config
    }

    /// Estimate the pupil centre of one eye
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn estimate(&self, eye: &EyeRegion) -> PupilEstimate {
        let side = eye.side();
        if !eye.is_valid() {
            return PupilEstimate::invalid(side, DetectionMiss::UpstreamInvalid);
        }

        let image = eye.image();
        let mask = eye.opening_mask();
        let opening = mask.iter().filter(|&&inside| inside).count();
        if opening == 0 {
            return PupilEstimate::invalid(side, DetectionMiss::EyeOccluded);
        }

        let histogram = masked_histogram(image, &mask);
        let low = histogram_percentile(&histogram, STRETCH_LOW_PERCENTILE);
        let high = histogram_percentile(&histogram, STRETCH_HIGH_PERCENTILE);
        let spread = high.saturating_sub(low);
        if spread < self.config.min_contrast {
            return PupilEstimate::invalid(side, DetectionMiss::LowContrast);
        }

        let stretched = stretch_image(image, low, high);
        let closed = close(&stretched, self.config.closing_radius);
        let threshold = (self.config.threshold_ratio * 255.0).round().clamp(0.0, 255.0) as u8;
        let dark: Vec<bool> = closed
            .pixels()
            .zip(mask.iter())
            .map(|(pixel, &inside)| inside && pixel[0] <= threshold)
            .collect();

        let blobs = label_components(&dark, &stretched);
        let Some(best) = blobs.into_iter().reduce(|best, blob| {
            let (a, b) = (blob.mean_intensity(), best.mean_intensity());
            let tie = (a - b).abs() <= MEAN_TIE_TOLERANCE;
            if (!tie && a < b) || (tie && blob.count > best.count) {
                blob
            } else {
                best
            }
        }) else {
            return PupilEstimate::invalid(side, DetectionMiss::NoPupilBlob);
        };

        let ratio = count_to_f32(best.count) / count_to_f32(opening);
        if best.count < self.config.min_blob_pixels || ratio < self.config.min_blob_ratio {
            return PupilEstimate::invalid(side, DetectionMiss::BlobTooSmall);
        }
        if ratio > self.config.max_blob_ratio {
            return PupilEstimate::invalid(side, DetectionMiss::BlobTooLarge);
        }

        let (w, h) = image.dimensions();
        let centroid = best.centroid();
        let position = Point::new(
            centroid.x.clamp(0.0, count_to_f32(w as usize)),
            centroid.y.clamp(0.0, count_to_f32(h as usize)),
        );
        let contrast = (f32::from(spread) / FULL_CONTRAST_SPREAD).min(1.0);

        PupilEstimate {
            side,
            position,
            frame_position: eye.to_frame(&position),
            confidence: (contrast * best.fill()).clamp(0.0, 1.0),
            area: best.count,
            validity: Validity::Valid,
        }
    }
}
