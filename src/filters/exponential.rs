use super::GazeFilter;
use crate::{Error, Result};

/// Exponential smoothing filter
pub struct ExponentialFilter {
    alpha: f64,
    last: Option<(f64, f64)>,
}

impl ExponentialFilter {
    /// # Errors
    ///
    /// Returns an error unless `alpha` is in (0, 1]
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::FilterError(format!("Alpha must be in (0, 1], got {alpha}")));
        }
        Ok(Self { alpha, last: None })
    }
}

impl GazeFilter for ExponentialFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        // Incremental form keeps a constant input exact
        let filtered = match self.last {
            Some((lx, ly)) => (lx + self.alpha * (x - lx), ly + self.alpha * (y - ly)),
            None => (x, y),
        };
        self.last = Some(filtered);
        filtered
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}
