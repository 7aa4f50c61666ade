//! Blink detection from the eye aspect ratio (EAR).
//!
//! Each eye keeps a short moving average of its EAR. An eye counts as
//! closed while the average is below its threshold; a blink is reported
//! when the eye opens again after enough closed frames.

use crate::constants::{
    DEFAULT_BLINK_COOLDOWN_MS, DEFAULT_BLINK_MIN_FRAMES, DEFAULT_EAR_THRESHOLD, DEFAULT_EAR_WINDOW,
    EAR_THRESHOLD_FACTOR, FALLBACK_OPEN_EAR,
};
use crate::eye_region::EyeSide;
use crate::utils::safe_cast::count_to_f32;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Blink detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub enabled: bool,
    /// EAR moving-average window in frames
    pub window: usize,
    pub left_threshold: f32,
    pub right_threshold: f32,
    /// Closed frames needed before a reopening counts as a blink
    pub min_consecutive_frames: usize,
    /// Minimum time between two blinks of the same eye
    pub cooldown_ms: u64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: DEFAULT_EAR_WINDOW,
            left_threshold: DEFAULT_EAR_THRESHOLD,
            right_threshold: DEFAULT_EAR_THRESHOLD,
            min_consecutive_frames: DEFAULT_BLINK_MIN_FRAMES,
            cooldown_ms: DEFAULT_BLINK_COOLDOWN_MS,
        }
    }
}

/// A completed blink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlinkEvent {
    pub side: EyeSide,
    /// Timestamp of the frame on which the eye reopened
    pub timestamp: Duration,
    /// Number of frames the eye stayed closed
    pub closed_frames: usize,
}

#[derive(Debug, Clone)]
struct EyeBlinkState {
    threshold: f32,
    window: usize,
    ears: VecDeque<f32>,
    closed_frames: usize,
    last_blink: Option<Duration>,
}

impl EyeBlinkState {
    fn new(threshold: f32, window: usize) -> Self {
        let window = window.max(1);
        Self {
            threshold,
            window,
            ears: VecDeque::with_capacity(window),
            closed_frames: 0,
            last_blink: None,
        }
    }

    fn average(&self) -> Option<f32> {
        if self.ears.is_empty() {
            return None;
        }
        Some(self.ears.iter().sum::<f32>() / count_to_f32(self.ears.len()))
    }

    /// Feed one EAR sample; returns the closed-frame count of a finished blink
    fn update(&mut self, ear: f32, now: Duration, min_frames: usize, cooldown: Duration) -> Option<usize> {
        if self.ears.len() >= self.window {
            self.ears.pop_front();
        }
        self.ears.push_back(ear);

        let average = self.average().unwrap_or(ear);
        if average < self.threshold {
            self.closed_frames += 1;
            return None;
        }

        let closed = std::mem::take(&mut self.closed_frames);
        let cooled = self
            .last_blink
            .map_or(true, |last| now.saturating_sub(last) > cooldown);
        if closed >= min_frames && cooled {
            self.last_blink = Some(now);
            return Some(closed);
        }
        None
    }
}

/// Per-eye blink detector
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    left: EyeBlinkState,
    right: EyeBlinkState,
    min_frames: usize,
    cooldown: Duration,
}

impl BlinkDetector {
    #[must_use]
    pub fn new(config: &BlinkConfig) -> Self {
        Self {
            left: EyeBlinkState::new(config.left_threshold, config.window),
            right: EyeBlinkState::new(config.right_threshold, config.window),
            min_frames: config.min_consecutive_frames,
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }

    /// Feed the EAR of each visible eye for one frame. An eye that is not
    /// visible is skipped and keeps its state.
    pub fn update(&mut self, left_ear: Option<f32>, right_ear: Option<f32>, now: Duration) -> Vec<BlinkEvent> {
        let mut events = Vec::new();
        for (side, ear) in [(EyeSide::Left, left_ear), (EyeSide::Right, right_ear)] {
            let Some(ear) = ear else { continue };
            let state = match side {
                EyeSide::Left => &mut self.left,
                EyeSide::Right => &mut self.right,
            };
            if let Some(closed_frames) = state.update(ear, now, self.min_frames, self.cooldown) {
                debug!("{side:?} blink after {closed_frames} closed frames");
                events.push(BlinkEvent {
                    side,
                    timestamp: now,
                    closed_frames,
                });
            }
        }
        events
    }

    /// Smoothed EAR of one eye
    #[must_use]
    pub fn average_ear(&self, side: EyeSide) -> Option<f32> {
        match side {
            EyeSide::Left => self.left.average(),
            EyeSide::Right => self.right.average(),
        }
    }

    pub fn reset(&mut self) {
        for state in [&mut self.left, &mut self.right] {
            state.ears.clear();
            state.closed_frames = 0;
            state.last_blink = None;
        }
    }
}

/// Blink threshold from open-eye EAR samples of both eyes:
/// a fixed fraction of the smaller of the two means.
#[must_use]
pub fn calibrate_ear_threshold(left: &[f32], right: &[f32]) -> f32 {
    let mean = |values: &[f32]| {
        if values.is_empty() {
            FALLBACK_OPEN_EAR
        } else {
            values.iter().sum::<f32>() / count_to_f32(values.len())
        }
    };
    EAR_THRESHOLD_FACTOR * mean(left).min(mean(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn detector() -> BlinkDetector {
        BlinkDetector::new(&BlinkConfig {
            window: 1,
            ..BlinkConfig::default()
        })
    }

    #[test]
    fn test_blink_on_reopen() {
        let mut blinks = detector();
        assert!(blinks.update(Some(0.3), Some(0.3), ms(0)).is_empty());
        assert!(blinks.update(Some(0.1), Some(0.3), ms(33)).is_empty());
        assert!(blinks.update(Some(0.1), Some(0.3), ms(66)).is_empty());
        let events = blinks.update(Some(0.3), Some(0.3), ms(600));
        assert_eq!(
            events,
            vec![BlinkEvent {
                side: EyeSide::Left,
                timestamp: ms(600),
                closed_frames: 2
            }]
        );
    }

    #[test]
    fn test_single_closed_frame_is_not_a_blink() {
        let mut blinks = detector();
        blinks.update(Some(0.1), None, ms(600));
        assert!(blinks.update(Some(0.3), None, ms(633)).is_empty());
    }

    #[test]
    fn test_cooldown() {
        let mut blinks = detector();
        let mut t = 600;
        let mut count = 0;
        for _ in 0..2 {
            for ear in [0.1, 0.1, 0.3] {
                count += blinks.update(None, Some(ear), ms(t)).len();
                t += 33;
            }
        }
        // The second blink ends 99 ms after the first
        assert_eq!(count, 1);
    }

    #[test]
    fn test_moving_average_smooths_noise() {
        let mut blinks = BlinkDetector::new(&BlinkConfig::default());
        for (i, ear) in [0.3, 0.3, 0.3, 0.3, 0.1].into_iter().enumerate() {
            blinks.update(Some(ear), Some(ear), ms(i as u64 * 33));
        }
        // One low sample in a window of five stays above the threshold
        assert!(blinks.average_ear(EyeSide::Left).unwrap() > DEFAULT_EAR_THRESHOLD);
    }

    #[test]
    fn test_calibrate_threshold() {
        let threshold = calibrate_ear_threshold(&[0.30, 0.32], &[0.28]);
        assert!((threshold - 0.85 * 0.28).abs() < 1e-6);
        assert!((calibrate_ear_threshold(&[], &[0.4]) - 0.85 * 0.18).abs() < 1e-6);
    }
}
