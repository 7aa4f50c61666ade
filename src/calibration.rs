//! Mapping from normalized gaze offsets to screen coordinates.
//!
//! Maps are fitted by linear least squares from calibration samples (the
//! subject fixates known targets while offsets are recorded) and can be
//! stored as JSON next to the configuration.

use crate::geometry::Point;
use crate::{Error, Result};
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Singular values below this fraction of the largest one count as zero
const RANK_TOLERANCE: f64 = 1e-9;

/// Calibration targets as fractions of the screen: centre, left, right, up, down
pub const FIVE_POINT_TARGETS: [(f32, f32); 5] = [(0.5, 0.5), (0.2, 0.5), (0.8, 0.5), (0.5, 0.2), (0.5, 0.8)];

/// Five-point calibration targets in pixels for a `width` x `height` screen
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn five_point_targets(width: u32, height: u32) -> Vec<Point> {
    FIVE_POINT_TARGETS
        .iter()
        .map(|&(fx, fy)| Point::new(fx * width as f32, fy * height as f32))
        .collect()
}

/// One recorded offset while the subject looked at `target`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub offset: Point,
    pub target: Point,
}

impl CalibrationSample {
    #[must_use]
    pub fn new(offset: Point, target: Point) -> Self {
        Self { offset, target }
    }
}

/// Screen mapping of a normalized gaze offset `(x, y)`.
///
/// Each row holds the coefficients of one screen axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CalibrationMap {
    /// `s = c0 + c1 x + c2 y`
    Affine { x: [f64; 3], y: [f64; 3] },
    /// `s = c0 + c1 x + c2 y + c3 x^2 + c4 x y + c5 y^2`
    Quadratic { x: [f64; 6], y: [f64; 6] },
}

impl CalibrationMap {
    /// Map that scales offsets in [-1, 1] linearly onto a screen
    #[must_use]
    pub fn linear_screen(width: f64, height: f64) -> Self {
        Self::Affine {
            x: [width / 2.0, width / 2.0, 0.0],
            y: [height / 2.0, 0.0, height / 2.0],
        }
    }

    /// Screen point for a normalized offset
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&self, offset: &Point) -> Point {
        let (x, y) = (f64::from(offset.x), f64::from(offset.y));
        let (sx, sy) = match self {
            Self::Affine { x: cx, y: cy } => {
                let terms = affine_terms(x, y);
                (dot(cx, &terms), dot(cy, &terms))
            }
            Self::Quadratic { x: cx, y: cy } => {
                let terms = quadratic_terms(x, y);
                (dot(cx, &terms), dot(cy, &terms))
            }
        };
        Point::new(sx as f32, sy as f32)
    }

    /// Fit an affine map; needs three samples not on one line
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than three samples or degenerate offsets
    pub fn fit_affine(samples: &[CalibrationSample]) -> Result<Self> {
        let (x, y) = fit::<3>(samples, |o| affine_terms(f64::from(o.x), f64::from(o.y)))?;
        Ok(Self::Affine { x, y })
    }

    /// Fit a second-order polynomial map; needs six well-spread samples
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than six samples or degenerate offsets
    pub fn fit_quadratic(samples: &[CalibrationSample]) -> Result<Self> {
        let (x, y) = fit::<6>(samples, |o| quadratic_terms(f64::from(o.x), f64::from(o.y)))?;
        Ok(Self::Quadratic { x, y })
    }

    /// Write the map as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        info!("Saved calibration to {}", path.as_ref().display());
        Ok(())
    }

    /// Read a map written by [`CalibrationMap::save_json`].
    ///
    /// A missing file is not an error: the tracker then runs uncalibrated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No calibration at {}", path.display());
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let map = serde_json::from_str(&text)?;
        info!("Loaded calibration from {}", path.display());
        Ok(Some(map))
    }
}

fn affine_terms(x: f64, y: f64) -> [f64; 3] {
    [1.0, x, y]
}

fn quadratic_terms(x: f64, y: f64) -> [f64; 6] {
    [1.0, x, y, x * x, x * y, y * y]
}

fn dot<const N: usize>(coefficients: &[f64; N], terms: &[f64; N]) -> f64 {
    coefficients.iter().zip(terms).map(|(c, t)| c * t).sum()
}

/// Least-squares fit of both screen axes over the given basis
fn fit<const N: usize>(
    samples: &[CalibrationSample],
    basis: impl Fn(&Point) -> [f64; N],
) -> Result<([f64; N], [f64; N])> {
    if samples.len() < N {
        return Err(Error::Calibration(format!(
            "Need at least {N} samples, got {}",
            samples.len()
        )));
    }

    let design = DMatrix::from_fn(samples.len(), N, |row, col| basis(&samples[row].offset)[col]);
    let targets_x = DVector::from_iterator(samples.len(), samples.iter().map(|s| f64::from(s.target.x)));
    let targets_y = DVector::from_iterator(samples.len(), samples.iter().map(|s| f64::from(s.target.y)));

    let svd = design.svd(true, true);
    let largest = svd.singular_values.max();
    if svd.rank(largest * RANK_TOLERANCE) < N {
        return Err(Error::Calibration("Calibration offsets are degenerate".to_string()));
    }

    let solve = |targets: &DVector<f64>| -> Result<[f64; N]> {
        let solution = svd
            .solve(targets, largest * RANK_TOLERANCE)
            .map_err(|e| Error::Calibration(e.to_string()))?;
        let mut coefficients = [0.0; N];
        coefficients.copy_from_slice(solution.as_slice());
        Ok(coefficients)
    };

    Ok((solve(&targets_x)?, solve(&targets_y)?))
}
