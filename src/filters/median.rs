use super::GazeFilter;
use crate::{Error, Result};
use std::collections::VecDeque;

/// Median filter
pub struct MedianFilter {
    window_size: usize,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
}

impl MedianFilter {
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

    fn median(values: &VecDeque<f64>) -> f64 {
        let mut sorted: Vec<f64> = values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let len = sorted.len();
        if len == 0 {
            0.0
        } else if len % 2 == 0 {
            let (a, b) = (sorted[len / 2 - 1], sorted[len / 2]);
            a + (b - a) / 2.0
        } else {
            sorted[len / 2]
        }
    }
}

impl GazeFilter for MedianFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        if self.x_buffer.len() >= self.window_size {
            self.x_buffer.pop_front();
            self.y_buffer.pop_front();
        }
        self.x_buffer.push_back(x);
        self.y_buffer.push_back(y);

        (Self::median(&self.x_buffer), Self::median(&self.y_buffer))
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
    }

    fn name(&self) -> &str {
        "MedianFilter"
    }
}
