//! Temporal smoothing of normalized gaze offsets.
//!
//! A filter that has only ever seen one point returns that point bit for
//! bit. After other input, a constant stream converges on the point: the
//! window filters reach it exactly once the window is full, while the
//! exponential and Kalman states approach it to within f64 rounding. The
//! tracker narrows filter output to f32, where the converged value is exact.

/// Kalman filter with a constant-velocity model
pub mod kalman;

/// Moving average over a fixed window
pub mod moving_average;

/// Median over a fixed window, for outlier rejection
pub mod median;

/// Exponential smoothing
pub mod exponential;

use crate::constants::{DEFAULT_EXPONENTIAL_ALPHA, DEFAULT_SMOOTHING_WINDOW};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smoothing filter over a 2D signal
pub trait GazeFilter: Send {
    /// Feed one sample, returning the smoothed value
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64);

    /// Forget all history
    fn reset(&mut self);

    /// Filter name for logging
    fn name(&self) -> &str;
}

/// No-op filter that passes through values unchanged
pub struct NoFilter;

impl GazeFilter for NoFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Available smoothing strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    None,
    MovingAverage,
    Exponential,
    Median,
    Kalman,
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "nofilter" => Ok(Self::None),
            "moving_average" | "movingaverage" => Ok(Self::MovingAverage),
            "exponential" => Ok(Self::Exponential),
            "median" => Ok(Self::Median),
            "kalman" => Ok(Self::Kalman),
            _ => Err(Error::FilterError(format!("Unknown filter type: {s}"))),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::MovingAverage => "moving_average",
            Self::Exponential => "exponential",
            Self::Median => "median",
            Self::Kalman => "kalman",
        };
        f.write_str(name)
    }
}

/// Create a filter. `window` sizes the windowed filters, `alpha` the
/// exponential one; each is ignored by the filters that do not use it.
///
/// # Errors
///
/// Returns an error for a zero window or an alpha outside (0, 1]
pub fn create_filter(kind: FilterKind, window: usize, alpha: f64) -> Result<Box<dyn GazeFilter>> {
    match kind {
        FilterKind::None => Ok(Box::new(NoFilter)),
        FilterKind::MovingAverage => Ok(Box::new(moving_average::MovingAverageFilter::new(window)?)),
        FilterKind::Median => Ok(Box::new(median::MedianFilter::new(window)?)),
        FilterKind::Exponential => Ok(Box::new(exponential::ExponentialFilter::new(alpha)?)),
        FilterKind::Kalman => Ok(Box::new(kalman::KalmanFilter::new())),
    }
}

/// Create a filter from a `name[:parameter]` string such as
/// `moving_average:8` or `exponential:0.3`
///
/// # Errors
///
/// Returns an error for an unknown name or an unparsable parameter
pub fn parse_filter(text: &str) -> Result<Box<dyn GazeFilter>> {
    let (name, parameter) = match text.split_once(':') {
        Some((name, parameter)) => (name, Some(parameter)),
        None => (text, None),
    };
    let kind: FilterKind = name.parse()?;

    let mut window = DEFAULT_SMOOTHING_WINDOW;
    let mut alpha = DEFAULT_EXPONENTIAL_ALPHA;
    if let Some(parameter) = parameter {
        match kind {
            FilterKind::MovingAverage | FilterKind::Median => {
                window = parameter
                    .parse()
                    .map_err(|_| Error::FilterError(format!("Window size must be an integer, got {parameter}")))?;
            }
            FilterKind::Exponential => {
                alpha = parameter
                    .parse()
                    .map_err(|_| Error::FilterError(format!("Alpha must be a number, got {parameter}")))?;
            }
            FilterKind::None | FilterKind::Kalman => {
                return Err(Error::FilterError(format!("Filter {kind} takes no parameter")));
            }
        }
    }
    create_filter(kind, window, alpha)
}
