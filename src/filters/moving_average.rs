use super::GazeFilter;
use crate::{Error, Result};
use std::collections::VecDeque;

/// Moving average filter.
///
/// Averages deviations from the newest sample rather than raw values, so a
/// window of identical samples returns that sample without rounding error.
pub struct MovingAverageFilter {
    window_size: usize,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
}

impl MovingAverageFilter {
    /// # Errors
    ///
    /// Returns an error for a zero window
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::FilterError("Window size must be at least 1".to_string()));
        }
        Ok(Self {
            window_size,
            x_buffer: VecDeque::with_capacity(window_size),
            y_buffer: VecDeque::with_capacity(window_size),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(buffer: &VecDeque<f64>, reference: f64) -> f64 {
        let deviation: f64 = buffer.iter().map(|v| v - reference).sum();
        reference + deviation / buffer.len() as f64
    }
}

impl GazeFilter for MovingAverageFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        if self.x_buffer.len() >= self.window_size {
            self.x_buffer.pop_front();
            self.y_buffer.pop_front();
        }
        self.x_buffer.push_back(x);
        self.y_buffer.push_back(y);

        (Self::average(&self.x_buffer, x), Self::average(&self.y_buffer, y))
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
    }

    fn name(&self) -> &str {
        "MovingAverageFilter"
    }
}
