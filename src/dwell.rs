//! Dwell selection on calibrated screen points.
//!
//! Holding gaze within a radius for long enough selects that point. The
//! detector only reports events; acting on them is up to the consumer.

use crate::constants::{
    DEFAULT_DWELL_ARM_DELAY_MS, DEFAULT_DWELL_COOLDOWN_MS, DEFAULT_DWELL_RADIUS_PX, DEFAULT_DWELL_TIME_MS,
};
use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dwell detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    pub enabled: bool,
    /// Gaze must stay this close to the candidate point
    pub radius_px: f32,
    /// Settling time after a new candidate before timing starts
    pub arm_delay_ms: u64,
    /// Time to hold for a selection
    pub dwell_time_ms: u64,
    /// Quiet period after a selection
    pub cooldown_ms: u64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius_px: DEFAULT_DWELL_RADIUS_PX,
            arm_delay_ms: DEFAULT_DWELL_ARM_DELAY_MS,
            dwell_time_ms: DEFAULT_DWELL_TIME_MS,
            cooldown_ms: DEFAULT_DWELL_COOLDOWN_MS,
        }
    }
}

/// A completed dwell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DwellEvent {
    /// The gaze point that completed the dwell
    pub point: Point,
    pub timestamp: Duration,
}

#[derive(Debug, Clone)]
pub struct DwellDetector {
    radius: f32,
    arm_delay: Duration,
    dwell_time: Duration,
    cooldown: Duration,
    candidate: Option<Point>,
    arm_start: Duration,
    dwell_start: Option<Duration>,
    cooldown_until: Option<Duration>,
    progress: f32,
}

impl DwellDetector {
    #[must_use]
    pub fn new(config: &DwellConfig) -> Self {
        Self {
            radius: config.radius_px,
            arm_delay: Duration::from_millis(config.arm_delay_ms),
            dwell_time: Duration::from_millis(config.dwell_time_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            candidate: None,
            arm_start: Duration::ZERO,
            dwell_start: None,
            cooldown_until: None,
            progress: 0.0,
        }
    }

    /// Dwell progress in [0, 1]
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Feed the gaze point of one frame
    pub fn update(&mut self, point: Point, now: Duration) -> Option<DwellEvent> {
        if self.cooldown_until.is_some_and(|until| now < until) {
            self.progress = 0.0;
            return None;
        }

        match self.candidate {
            Some(candidate) if candidate.distance(&point) <= self.radius => {}
            _ => {
                self.candidate = Some(point);
                self.arm_start = now;
                self.dwell_start = None;
                self.progress = 0.0;
                return None;
            }
        }

        let Some(dwell_start) = self.dwell_start else {
            if now.saturating_sub(self.arm_start) >= self.arm_delay {
                self.dwell_start = Some(now);
            }
            self.progress = 0.0;
            return None;
        };

        let elapsed = now.saturating_sub(dwell_start);
        self.progress = (elapsed.as_secs_f32() / self.dwell_time.as_secs_f32().max(f32::EPSILON)).clamp(0.0, 1.0);
        if elapsed < self.dwell_time {
            return None;
        }

        self.cooldown_until = Some(now + self.cooldown);
        self.reset();
        Some(DwellEvent { point, timestamp: now })
    }

    /// Drop the current candidate (e.g. when gaze is lost)
    pub fn reset(&mut self) {
        self.candidate = None;
        self.dwell_start = None;
        self.progress = 0.0;
    }
}
