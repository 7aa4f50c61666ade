//! Bounded history of recent gaze offsets and its dispersion statistics.

use crate::geometry::Point;
use std::collections::VecDeque;

/// Fixed-size window of recent valid gaze offsets, oldest evicted first
#[derive(Debug, Clone)]
pub struct GazeHistory {
    window_size: usize,
    fixation_threshold: f64,
    x_history: VecDeque<f64>,
    y_history: VecDeque<f64>,
}

impl GazeHistory {
    /// `fixation_threshold` is the largest per-axis standard deviation that
    /// still counts as a fixation
    #[must_use]
    pub fn new(window_size: usize, fixation_threshold: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            fixation_threshold,
            x_history: VecDeque::with_capacity(window_size),
            y_history: VecDeque::with_capacity(window_size),
        }
    }

    pub fn push(&mut self, offset: Point) {
        if self.x_history.len() >= self.window_size {
            self.x_history.pop_front();
            self.y_history.pop_front();
        }
        self.x_history.push_back(f64::from(offset.x));
        self.y_history.push_back(f64::from(offset.y));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.x_history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x_history.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.window_size
    }

    /// Offsets from oldest to newest
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        self.x_history
            .iter()
            .zip(self.y_history.iter())
            .map(|(&x, &y)| Point::new(x as f32, y as f32))
    }

    /// Per-axis statistics, once the window is full
    #[must_use]
    pub fn stats(&self) -> Option<(Statistics, Statistics)> {
        if self.x_history.len() < self.window_size {
            return None;
        }
        Some((
            Statistics::from_window(&self.x_history),
            Statistics::from_window(&self.y_history),
        ))
    }

    /// Whether the full window stays within the fixation threshold
    #[must_use]
    pub fn is_fixating(&self) -> bool {
        self.stats()
            .is_some_and(|(x, y)| x.std_dev <= self.fixation_threshold && y.std_dev <= self.fixation_threshold)
    }

    pub fn clear(&mut self) {
        self.x_history.clear();
        self.y_history.clear();
    }
}

/// Statistical summary of a data window
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl Statistics {
    #[allow(clippy::cast_precision_loss)]
    fn from_window(data: &VecDeque<f64>) -> Self {
        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            range: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_window() {
        let mut history = GazeHistory::new(3, 0.05);
        for i in 0..5 {
            history.push(Point::new(i as f32, 0.0));
        }
        assert_eq!(history.len(), 3);
        let xs: Vec<f32> = history.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fixation_detection() {
        let mut history = GazeHistory::new(5, 0.05);
        for i in 0..4 {
            history.push(Point::new(0.1 + i as f32 * 0.01, -0.2));
            // Not judged before the window is full
            assert!(!history.is_fixating());
        }
        history.push(Point::new(0.12, -0.21));
        assert!(history.is_fixating());

        // Saccade
        for offset in [0.8, -0.6, 0.5] {
            history.push(Point::new(offset, 0.0));
        }
        assert!(!history.is_fixating());
    }

    #[test]
    fn test_statistics_calculation() {
        let data = VecDeque::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let stats = Statistics::from_window(&data);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.range, 4.0);
        assert!((stats.std_dev - std::f64::consts::SQRT_2).abs() < 1e-10);
    }
}
