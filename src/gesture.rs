//! Landmark gestures: mouth clicks, brow scrolling and a lip-pucker scroll
//! mode steered by vertical gaze.
//!
//! The detectors only report events. Turning them into pointer input is up
//! to the consumer.

use crate::constants::{
    DEFAULT_BROW_BASELINE_ALPHA, DEFAULT_BROW_DOWN_THRESHOLD, DEFAULT_BROW_REPEAT_MS, DEFAULT_BROW_UP_THRESHOLD,
    DEFAULT_BROW_WINDOW, DEFAULT_DOUBLE_CLICK_WINDOW_MS, DEFAULT_LIPS_CLOSED_RATIO, DEFAULT_LIP_GAZE_THRESHOLD,
    DEFAULT_LIP_REPEAT_MS, DEFAULT_LIP_TOGGLE_HOLD_MS, DEFAULT_MOUTH_ARM_RATIO, DEFAULT_MOUTH_CLOSE_RATIO,
    DEFAULT_MOUTH_COOLDOWN_MS, DEFAULT_PUCKER_RATIO, DEFAULT_RIGHT_CLICK_HOLD_MS, INNER_LIP_BOTTOM, INNER_LIP_TOP,
    LEFT_BROW_PEAK, LEFT_EYE_OUTER_CORNER, LEFT_UPPER_LID, MOUTH_LEFT_CORNER, MOUTH_RIGHT_CORNER, RIGHT_BROW_PEAK,
    RIGHT_EYE_OUTER_CORNER, RIGHT_UPPER_LID,
};
use crate::geometry::Point;
use crate::mark_detection::FaceLandmarks;
use crate::utils::safe_cast::count_to_f32;
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Gesture detector settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub enabled: bool,
    pub mouth: MouthClickConfig,
    pub brow: BrowScrollConfig,
    pub lip: LipScrollConfig,
}

impl GestureConfig {
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for thresholds that can never trigger
    pub fn validate(&self) -> Result<()> {
        let mouth = &self.mouth;
        if !(mouth.close_ratio > 0.0 && mouth.close_ratio < mouth.arm_ratio) {
            return Err(Error::ConfigError(
                "Mouth close ratio must be in (0.0, arm_ratio)".to_string(),
            ));
        }
        if self.brow.window == 0 {
            return Err(Error::ConfigError("Brow window must be greater than 0".to_string()));
        }
        if !(self.brow.baseline_alpha > 0.0 && self.brow.baseline_alpha <= 1.0) {
            return Err(Error::ConfigError("Brow baseline alpha must be in (0.0, 1.0]".to_string()));
        }
        if !(self.brow.up_threshold > 0.0 && self.brow.down_threshold > 0.0) {
            return Err(Error::ConfigError("Brow thresholds must be greater than 0".to_string()));
        }
        if !(self.lip.pucker_ratio > 0.0 && self.lip.closed_ratio > 0.0) {
            return Err(Error::ConfigError("Lip ratios must be greater than 0".to_string()));
        }
        if !(self.lip.gaze_threshold > 0.0 && self.lip.gaze_threshold < 1.0) {
            return Err(Error::ConfigError("Lip gaze threshold must be in (0.0, 1.0)".to_string()));
        }
        Ok(())
    }
}

/// Mouth click settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthClickConfig {
    pub enabled: bool,
    /// Open ratio above which the mouth counts as opened
    pub arm_ratio: f32,
    /// Open ratio below which an open mouth counts as closed again
    pub close_ratio: f32,
    /// Quiet period after any click
    pub cooldown_ms: u64,
    /// A second opening within this time of the first is a double click
    pub double_click_window_ms: u64,
    /// Holding the mouth open this long is a right click
    pub right_click_hold_ms: u64,
}

impl Default for MouthClickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            arm_ratio: DEFAULT_MOUTH_ARM_RATIO,
            close_ratio: DEFAULT_MOUTH_CLOSE_RATIO,
            cooldown_ms: DEFAULT_MOUTH_COOLDOWN_MS,
            double_click_window_ms: DEFAULT_DOUBLE_CLICK_WINDOW_MS,
            right_click_hold_ms: DEFAULT_RIGHT_CLICK_HOLD_MS,
        }
    }
}

/// Brow scroll settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowScrollConfig {
    pub enabled: bool,
    pub up_threshold: f32,
    pub down_threshold: f32,
    /// Moving-average window over the brow lift, in frames
    pub window: usize,
    /// Per-frame weight of the current lift in the neutral baseline
    pub baseline_alpha: f32,
    pub repeat_ms: u64,
}

impl Default for BrowScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            up_threshold: DEFAULT_BROW_UP_THRESHOLD,
            down_threshold: DEFAULT_BROW_DOWN_THRESHOLD,
            window: DEFAULT_BROW_WINDOW,
            baseline_alpha: DEFAULT_BROW_BASELINE_ALPHA,
            repeat_ms: DEFAULT_BROW_REPEAT_MS,
        }
    }
}

/// Lip scroll mode settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipScrollConfig {
    pub enabled: bool,
    /// Mouth width over eye width below which the lips count as puckered
    pub pucker_ratio: f32,
    /// Open ratio below which the lips count as closed
    pub closed_ratio: f32,
    /// Pucker hold time that toggles the scroll mode
    pub toggle_hold_ms: u64,
    pub repeat_ms: u64,
    /// Vertical gaze offset beyond which the mode scrolls
    pub gaze_threshold: f32,
}

impl Default for LipScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pucker_ratio: DEFAULT_PUCKER_RATIO,
            closed_ratio: DEFAULT_LIPS_CLOSED_RATIO,
            toggle_hold_ms: DEFAULT_LIP_TOGGLE_HOLD_MS,
            repeat_ms: DEFAULT_LIP_REPEAT_MS,
            gaze_threshold: DEFAULT_LIP_GAZE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouthGesture {
    Click,
    DoubleClick,
    RightClick,
}

/// A recognized mouth gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouthEvent {
    pub gesture: MouthGesture,
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// What produced a scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollSource {
    Brow,
    Lip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollEvent {
    Scroll {
        source: ScrollSource,
        direction: ScrollDirection,
        timestamp: Duration,
    },
    /// The lip scroll mode was switched on or off
    Mode { enabled: bool, timestamp: Duration },
}

/// Inner-lip gap over mouth width
#[must_use]
pub fn mouth_open_ratio(landmarks: &FaceLandmarks) -> f32 {
    let p = landmarks.points();
    let gap = (p[INNER_LIP_BOTTOM].y - p[INNER_LIP_TOP].y).abs();
    gap / mouth_width(p).max(f32::EPSILON)
}

/// Mouth width over the outer eye corner width
#[must_use]
pub fn pucker_ratio(landmarks: &FaceLandmarks) -> f32 {
    let p = landmarks.points();
    let eyes = (p[RIGHT_EYE_OUTER_CORNER].x - p[LEFT_EYE_OUTER_CORNER].x).abs();
    mouth_width(p) / eyes.max(f32::EPSILON)
}

fn mouth_width(p: &[Point]) -> f32 {
    (p[MOUTH_RIGHT_CORNER].x - p[MOUTH_LEFT_CORNER].x).abs()
}

/// Mean height of the brow peaks above the upper lids.
///
/// Measured with the eye line levelled and scaled to unit length, so head
/// roll, distance and translation cancel out. `None` when the outer eye
/// corners coincide.
#[must_use]
pub fn brow_lift(landmarks: &FaceLandmarks) -> Option<f32> {
    let p = landmarks.points();
    let (left, right) = (p[LEFT_EYE_OUTER_CORNER], p[RIGHT_EYE_OUTER_CORNER]);
    let span = left.distance(&right);
    if span < f32::EPSILON {
        return None;
    }
    let (cos, sin) = ((right.x - left.x) / span, (right.y - left.y) / span);
    // Vertical component of (lid - brow) in the levelled frame
    let height = |brow: Point, lid: Point| (cos * (lid.y - brow.y) - sin * (lid.x - brow.x)) / span;

    let lid = |[a, b]: [usize; 2]| p[a].midpoint(&p[b]);
    let left_lift = height(p[LEFT_BROW_PEAK], lid(LEFT_UPPER_LID));
    let right_lift = height(p[RIGHT_BROW_PEAK], lid(RIGHT_UPPER_LID));
    Some((left_lift + right_lift) / 2.0)
}

/// Mouth click state machine.
///
/// Opening the mouth arms it; closing it again clicks. A second opening
/// within the double-click window is a double click, and holding the mouth
/// open is a right click. No gesture fires within the cooldown of the
/// previous one.
#[derive(Debug, Clone)]
pub struct MouthClicker {
    arm_ratio: f32,
    close_ratio: f32,
    cooldown: Duration,
    double_click_window: Duration,
    right_click_hold: Duration,
    open_since: Option<Duration>,
    right_fired: bool,
    first_open: Option<Duration>,
    last_action: Option<Duration>,
}

impl MouthClicker {
    #[must_use]
    pub fn new(config: &MouthClickConfig) -> Self {
        Self {
            arm_ratio: config.arm_ratio,
            close_ratio: config.close_ratio,
            cooldown: Duration::from_millis(config.cooldown_ms),
            double_click_window: Duration::from_millis(config.double_click_window_ms),
            right_click_hold: Duration::from_millis(config.right_click_hold_ms),
            open_since: None,
            right_fired: false,
            first_open: None,
            last_action: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open_since.is_some()
    }

    fn cooled(&self, now: Duration) -> bool {
        self.last_action
            .map_or(true, |last| now.saturating_sub(last) > self.cooldown)
    }

    fn fire(&mut self, gesture: MouthGesture, now: Duration) -> MouthEvent {
        debug!("Mouth {gesture:?} at {now:?}");
        self.last_action = Some(now);
        MouthEvent { gesture, timestamp: now }
    }

    /// Feed one frame's open ratio
    pub fn update(&mut self, open_ratio: f32, now: Duration) -> Option<MouthEvent> {
        let Some(open_since) = self.open_since else {
            if open_ratio <= self.arm_ratio {
                return None;
            }
            self.open_since = Some(now);
            self.right_fired = false;
            if !self.cooled(now) {
                return None;
            }
            return match self.first_open {
                Some(first) if now.saturating_sub(first) <= self.double_click_window => {
                    self.first_open = None;
                    Some(self.fire(MouthGesture::DoubleClick, now))
                }
                _ => {
                    self.first_open = Some(now);
                    None
                }
            };
        };

        let mut event = None;
        if !self.right_fired && now.saturating_sub(open_since) >= self.right_click_hold && self.cooled(now) {
            self.right_fired = true;
            event = Some(self.fire(MouthGesture::RightClick, now));
        }
        if open_ratio < self.close_ratio {
            self.open_since = None;
            if !self.right_fired && self.first_open.is_some() && self.cooled(now) {
                event = Some(self.fire(MouthGesture::Click, now));
            }
        }
        event
    }

    pub fn reset(&mut self) {
        self.open_since = None;
        self.right_fired = false;
        self.first_open = None;
        self.last_action = None;
    }
}

/// Scrolls while the brows sit above or below their neutral height.
///
/// The neutral height is a slow running average of the smoothed lift, so
/// it adapts to the user and to slow changes in head pose.
#[derive(Debug, Clone)]
pub struct BrowScroller {
    up_threshold: f32,
    down_threshold: f32,
    window: usize,
    baseline_alpha: f32,
    repeat: Duration,
    lifts: VecDeque<f32>,
    neutral: Option<f32>,
    last_scroll: Option<Duration>,
}

impl BrowScroller {
    #[must_use]
    pub fn new(config: &BrowScrollConfig) -> Self {
        let window = config.window.max(1);
        Self {
            up_threshold: config.up_threshold,
            down_threshold: config.down_threshold,
            window,
            baseline_alpha: config.baseline_alpha,
            repeat: Duration::from_millis(config.repeat_ms),
            lifts: VecDeque::with_capacity(window),
            neutral: None,
            last_scroll: None,
        }
    }

    #[must_use]
    pub fn neutral(&self) -> Option<f32> {
        self.neutral
    }

    /// Feed one frame's brow lift
    pub fn update(&mut self, lift: f32, now: Duration) -> Option<ScrollEvent> {
        if self.lifts.len() >= self.window {
            self.lifts.pop_front();
        }
        self.lifts.push_back(lift);
        let smoothed = self.lifts.iter().sum::<f32>() / count_to_f32(self.lifts.len());

        let neutral = match self.neutral {
            Some(neutral) => (1.0 - self.baseline_alpha) * neutral + self.baseline_alpha * smoothed,
            None => smoothed,
        };
        self.neutral = Some(neutral);

        if self
            .last_scroll
            .is_some_and(|last| now.saturating_sub(last) < self.repeat)
        {
            return None;
        }
        let delta = smoothed - neutral;
        let direction = if delta > self.up_threshold {
            ScrollDirection::Up
        } else if delta < -self.down_threshold {
            ScrollDirection::Down
        } else {
            return None;
        };
        self.last_scroll = Some(now);
        Some(ScrollEvent::Scroll {
            source: ScrollSource::Brow,
            direction,
            timestamp: now,
        })
    }

    pub fn reset(&mut self) {
        self.lifts.clear();
        self.neutral = None;
        self.last_scroll = None;
    }
}

/// Scroll mode toggled by holding puckered, closed lips.
///
/// While the mode is on, looking up or down past the gaze threshold
/// scrolls in that direction.
#[derive(Debug, Clone)]
pub struct LipScroller {
    pucker_ratio: f32,
    closed_ratio: f32,
    toggle_hold: Duration,
    repeat: Duration,
    gaze_threshold: f32,
    mode_on: bool,
    held_since: Option<Duration>,
    latched: bool,
    last_scroll: Option<Duration>,
}

impl LipScroller {
    #[must_use]
    pub fn new(config: &LipScrollConfig) -> Self {
        Self {
            pucker_ratio: config.pucker_ratio,
            closed_ratio: config.closed_ratio,
            toggle_hold: Duration::from_millis(config.toggle_hold_ms),
            repeat: Duration::from_millis(config.repeat_ms),
            gaze_threshold: config.gaze_threshold,
            mode_on: false,
            held_since: None,
            latched: false,
            last_scroll: None,
        }
    }

    #[must_use]
    pub fn is_mode_on(&self) -> bool {
        self.mode_on
    }

    /// Feed one frame. `gaze_y` is the vertical gaze offset, negative when
    /// looking up; `None` when the frame had no valid gaze.
    pub fn update(&mut self, pucker: f32, open_ratio: f32, gaze_y: Option<f32>, now: Duration) -> Option<ScrollEvent> {
        if pucker < self.pucker_ratio && open_ratio < self.closed_ratio {
            let since = match self.held_since {
                Some(since) => since,
                None => {
                    self.held_since = Some(now);
                    self.latched = false;
                    now
                }
            };
            if !self.latched && now.saturating_sub(since) >= self.toggle_hold {
                self.mode_on = !self.mode_on;
                self.latched = true;
                debug!("Lip scroll mode {}", if self.mode_on { "on" } else { "off" });
                return Some(ScrollEvent::Mode {
                    enabled: self.mode_on,
                    timestamp: now,
                });
            }
        } else {
            self.held_since = None;
            self.latched = false;
        }

        if !self.mode_on
            || self
                .last_scroll
                .is_some_and(|last| now.saturating_sub(last) < self.repeat)
        {
            return None;
        }
        let gaze_y = gaze_y?;
        let direction = if gaze_y < -self.gaze_threshold {
            ScrollDirection::Up
        } else if gaze_y > self.gaze_threshold {
            ScrollDirection::Down
        } else {
            return None;
        };
        self.last_scroll = Some(now);
        Some(ScrollEvent::Scroll {
            source: ScrollSource::Lip,
            direction,
            timestamp: now,
        })
    }

    pub fn reset(&mut self) {
        self.mode_on = false;
        self.held_since = None;
        self.latched = false;
        self.last_scroll = None;
    }
}

/// Gesture events of one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureFrame {
    pub mouth: Option<MouthEvent>,
    pub scrolls: Vec<ScrollEvent>,
}

/// All enabled gesture detectors, fed from the face landmarks
#[derive(Debug, Clone)]
pub struct GestureDetector {
    mouth: Option<MouthClicker>,
    brow: Option<BrowScroller>,
    lip: Option<LipScroller>,
}

impl GestureDetector {
    #[must_use]
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            mouth: config.mouth.enabled.then(|| MouthClicker::new(&config.mouth)),
            brow: config.brow.enabled.then(|| BrowScroller::new(&config.brow)),
            lip: config.lip.enabled.then(|| LipScroller::new(&config.lip)),
        }
    }

    /// Whether the lip scroll mode is on
    #[must_use]
    pub fn scroll_mode(&self) -> bool {
        self.lip.as_ref().is_some_and(LipScroller::is_mode_on)
    }

    pub fn update(&mut self, landmarks: &FaceLandmarks, gaze_y: Option<f32>, now: Duration) -> GestureFrame {
        let open_ratio = mouth_open_ratio(landmarks);
        let mut frame = GestureFrame {
            mouth: self.mouth.as_mut().and_then(|mouth| mouth.update(open_ratio, now)),
            scrolls: Vec::new(),
        };
        if let (Some(brow), Some(lift)) = (self.brow.as_mut(), brow_lift(landmarks)) {
            frame.scrolls.extend(brow.update(lift, now));
        }
        if let Some(lip) = self.lip.as_mut() {
            frame
                .scrolls
                .extend(lip.update(pucker_ratio(landmarks), open_ratio, gaze_y, now));
        }
        frame
    }

    pub fn reset(&mut self) {
        if let Some(mouth) = self.mouth.as_mut() {
            mouth.reset();
        }
        if let Some(brow) = self.brow.as_mut() {
            brow.reset();
        }
        if let Some(lip) = self.lip.as_mut() {
            lip.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::mark_detection::mean_shape_in;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn points() -> Vec<Point> {
        mean_shape_in(&Rect::new(0.0, 0.0, 300.0, 300.0))
    }

    fn with_mouth(mut points: Vec<Point>, open_ratio: f32) -> Vec<Point> {
        let width = points[MOUTH_RIGHT_CORNER].x - points[MOUTH_LEFT_CORNER].x;
        points[INNER_LIP_BOTTOM].y = points[INNER_LIP_TOP].y + open_ratio * width;
        points
    }

    fn landmarks(points: Vec<Point>) -> FaceLandmarks {
        FaceLandmarks::new(points).unwrap()
    }

    #[test]
    fn test_mouth_metrics() {
        let open = landmarks(with_mouth(points(), 0.4));
        assert!((mouth_open_ratio(&open) - 0.4).abs() < 1e-5);
        assert_eq!(mouth_open_ratio(&landmarks(with_mouth(points(), 0.0))), 0.0);

        // Mean face: mouth 0.347 wide, eyes 0.531 apart
        let neutral = landmarks(points());
        assert!((pucker_ratio(&neutral) - 0.347 / 0.531).abs() < 1e-3);
    }

    #[test]
    fn test_brow_lift_ignores_roll_and_scale() {
        let upright = brow_lift(&landmarks(points())).unwrap();
        assert!(upright > 0.0);

        let (sin, cos) = 20f32.to_radians().sin_cos();
        let rolled: Vec<Point> = points()
            .iter()
            .map(|p| {
                let (x, y) = (p.x - 150.0, p.y - 150.0);
                Point::new(0.5 * (cos * x - sin * y) + 40.0, 0.5 * (sin * x + cos * y) + 25.0)
            })
            .collect();
        assert!((brow_lift(&landmarks(rolled)).unwrap() - upright).abs() < 1e-4);

        let mut collapsed = points();
        collapsed[RIGHT_EYE_OUTER_CORNER] = collapsed[LEFT_EYE_OUTER_CORNER];
        assert!(brow_lift(&landmarks(collapsed)).is_none());
    }

    #[test]
    fn test_open_close_clicks_and_reopen_double_clicks() {
        let mut mouth = MouthClicker::new(&MouthClickConfig::default());
        assert_eq!(mouth.update(0.0, ms(0)), None);
        assert_eq!(mouth.update(0.4, ms(100)), None);
        assert!(mouth.is_open());
        // Between the thresholds nothing changes
        assert_eq!(mouth.update(0.1, ms(150)), None);
        assert!(mouth.is_open());

        let click = mouth.update(0.0, ms(200)).unwrap();
        assert_eq!(click.gesture, MouthGesture::Click);
        assert_eq!(click.timestamp, ms(200));

        let double = mouth.update(0.4, ms(1000)).unwrap();
        assert_eq!(double.gesture, MouthGesture::DoubleClick);
        assert_eq!(mouth.update(0.0, ms(1100)), None);
    }

    #[test]
    fn test_held_mouth_right_clicks_once() {
        let mut mouth = MouthClicker::new(&MouthClickConfig::default());
        assert_eq!(mouth.update(0.4, ms(0)), None);
        assert_eq!(mouth.update(0.4, ms(400)), None);
        let right = mouth.update(0.4, ms(800)).unwrap();
        assert_eq!(right.gesture, MouthGesture::RightClick);
        assert_eq!(mouth.update(0.4, ms(1600)), None);
        // Closing after a right click does not click as well
        assert_eq!(mouth.update(0.0, ms(1700)), None);
    }

    #[test]
    fn test_double_click_window_expires() {
        let mut mouth = MouthClicker::new(&MouthClickConfig::default());
        mouth.update(0.4, ms(0));
        assert_eq!(mouth.update(0.0, ms(100)).unwrap().gesture, MouthGesture::Click);
        assert_eq!(mouth.update(0.4, ms(2500)), None);
        assert_eq!(mouth.update(0.0, ms(2600)).unwrap().gesture, MouthGesture::Click);
    }

    #[test]
    fn test_mouth_cooldown_swallows_gestures() {
        let mut mouth = MouthClicker::new(&MouthClickConfig::default());
        mouth.update(0.4, ms(0));
        assert!(mouth.update(0.0, ms(100)).is_some());
        assert_eq!(mouth.update(0.4, ms(200)), None);
        assert_eq!(mouth.update(0.0, ms(300)), None);
        // The first opening is still pending
        assert_eq!(mouth.update(0.4, ms(1000)).unwrap().gesture, MouthGesture::DoubleClick);
    }

    fn shift_brows(dy: f32) -> FaceLandmarks {
        let mut points = points();
        for p in &mut points[17..27] {
            p.y += dy;
        }
        landmarks(points)
    }

    fn brow_scrolls(raised_by: f32) -> Vec<ScrollEvent> {
        let mut brow = BrowScroller::new(&BrowScrollConfig::default());
        let neutral = brow_lift(&landmarks(points())).unwrap();
        let moved = brow_lift(&shift_brows(raised_by)).unwrap();
        let mut t = 0;
        for _ in 0..30 {
            assert_eq!(brow.update(neutral, ms(t)), None);
            t += 33;
        }
        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(brow.update(moved, ms(t)));
            t += 33;
        }
        events
    }

    #[test]
    fn test_raised_brows_scroll_up_at_repeat_rate() {
        let events = brow_scrolls(-15.0);
        assert_eq!(events.len(), 4);
        let mut last = None;
        for event in events {
            let ScrollEvent::Scroll {
                source,
                direction,
                timestamp,
            } = event
            else {
                panic!("unexpected {event:?}");
            };
            assert_eq!(source, ScrollSource::Brow);
            assert_eq!(direction, ScrollDirection::Up);
            if let Some(last) = last {
                assert!(timestamp - last >= ms(90));
            }
            last = Some(timestamp);
        }
    }

    #[test]
    fn test_lowered_brows_scroll_down() {
        let events = brow_scrolls(15.0);
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| matches!(
            e,
            ScrollEvent::Scroll {
                direction: ScrollDirection::Down,
                ..
            }
        )));
    }

    #[test]
    fn test_lip_mode_toggles_and_scrolls_with_gaze() {
        let mut lip = LipScroller::new(&LipScrollConfig::default());
        let (puckered, relaxed) = (0.5, 0.65);

        assert_eq!(lip.update(puckered, 0.0, Some(-0.5), ms(0)), None);
        assert_eq!(lip.update(puckered, 0.0, Some(-0.5), ms(300)), None);
        assert_eq!(
            lip.update(puckered, 0.0, None, ms(600)),
            Some(ScrollEvent::Mode {
                enabled: true,
                timestamp: ms(600)
            })
        );
        assert!(lip.is_mode_on());
        // Still held: latched, and without gaze there is nothing to scroll
        assert_eq!(lip.update(puckered, 0.0, None, ms(700)), None);

        let scroll = |direction| ScrollEvent::Scroll {
            source: ScrollSource::Lip,
            direction,
            timestamp: Duration::ZERO,
        };
        let strip = |event: Option<ScrollEvent>| {
            event.map(|e| match e {
                ScrollEvent::Scroll { direction, .. } => scroll(direction),
                other => other,
            })
        };
        assert_eq!(strip(lip.update(relaxed, 0.0, Some(-0.5), ms(800))), Some(scroll(ScrollDirection::Up)));
        assert_eq!(lip.update(relaxed, 0.0, Some(-0.5), ms(850)), None);
        assert_eq!(strip(lip.update(relaxed, 0.0, Some(0.5), ms(950))), Some(scroll(ScrollDirection::Down)));
        assert_eq!(lip.update(relaxed, 0.0, Some(0.05), ms(1100)), None);

        // An open mouth is not a pucker
        assert_eq!(lip.update(puckered, 0.3, Some(0.0), ms(1200)), None);
        lip.update(puckered, 0.0, Some(0.0), ms(1300));
        assert_eq!(
            lip.update(puckered, 0.0, Some(0.0), ms(1900)),
            Some(ScrollEvent::Mode {
                enabled: false,
                timestamp: ms(1900)
            })
        );
        assert_eq!(lip.update(relaxed, 0.0, Some(-0.5), ms(2100)), None);
    }

    #[test]
    fn test_detector_on_steady_face_is_quiet() {
        let mut gestures = GestureDetector::new(&GestureConfig {
            enabled: true,
            ..GestureConfig::default()
        });
        let face = landmarks(with_mouth(points(), 0.0));
        for i in 0..60 {
            let frame = gestures.update(&face, Some(-0.9), ms(i * 33));
            assert_eq!(frame, GestureFrame::default());
        }
        assert!(!gestures.scroll_mode());
    }

    #[test]
    fn test_config_validation() {
        assert!(GestureConfig::default().validate().is_ok());
        let mut config = GestureConfig::default();
        config.mouth.close_ratio = 0.3;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
        let mut config = GestureConfig::default();
        config.brow.window = 0;
        assert!(config.validate().is_err());
    }
}
