//! Constants used throughout the library

/// Number of facial landmarks in the iBUG 68-point layout
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Landmark index range of the eye on the image's left (subject's right eye)
pub const LEFT_EYE_LANDMARKS: std::ops::Range<usize> = 36..42;

/// Landmark index range of the eye on the image's right (subject's left eye)
pub const RIGHT_EYE_LANDMARKS: std::ops::Range<usize> = 42..48;

/// Default frames per second assumption
pub const DEFAULT_FPS: f64 = 30.0;

/// Image normalization constants for the SCRFD face detector
pub const IMAGE_NORMALIZATION_OFFSET: f32 = 127.5;
pub const IMAGE_NORMALIZATION_SCALE: f32 = 128.0;

/// Input resolution of the 68-point landmark regressor
pub const LANDMARK_INPUT_SIZE: u32 = 128;

/// Default face detection confidence threshold
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.6;

/// Margin added around the eye contour, as a fraction of the eye width
pub const DEFAULT_EYE_MARGIN: f32 = 0.25;

/// Minimum eye contour width in pixels for an eye to be considered visible
pub const MIN_EYE_WIDTH_PX: f32 = 6.0;

/// Pupil estimator defaults
pub const DEFAULT_CLOSING_RADIUS: u32 = 1;
pub const DEFAULT_THRESHOLD_RATIO: f32 = 0.3;
pub const DEFAULT_MIN_CONTRAST: u8 = 20;
pub const DEFAULT_MIN_BLOB_RATIO: f32 = 0.01;
pub const DEFAULT_MAX_BLOB_RATIO: f32 = 0.6;
pub const DEFAULT_MIN_BLOB_PIXELS: usize = 4;

/// Percentiles used for contrast stretching
pub const STRETCH_LOW_PERCENTILE: f32 = 0.01;
pub const STRETCH_HIGH_PERCENTILE: f32 = 0.99;

/// Gaze angles reached at a normalized offset of 1.0
pub const DEFAULT_MAX_YAW_DEG: f32 = 30.0;
pub const DEFAULT_MAX_PITCH_DEG: f32 = 20.0;

/// Confidence multiplier when only one eye contributes
pub const DEFAULT_SINGLE_EYE_PENALTY: f32 = 0.6;

/// Default smoothing window size
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Default exponential filter alpha
pub const DEFAULT_EXPONENTIAL_ALPHA: f64 = 0.5;

/// Per-frame confidence multiplier while degraded
pub const DEFAULT_CONFIDENCE_DECAY: f32 = 0.85;

/// Default timeout for a single frame read
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 500;

/// Standard deviation of normalized gaze offsets below which gaze counts as a fixation
pub const DEFAULT_FIXATION_THRESHOLD: f64 = 0.05;

/// Blink detection defaults
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.22;
pub const DEFAULT_EAR_WINDOW: usize = 5;
pub const DEFAULT_BLINK_MIN_FRAMES: usize = 2;
pub const DEFAULT_BLINK_COOLDOWN_MS: u64 = 500;

/// Mean eye aspect ratio assumed when a calibration series is empty
pub const FALLBACK_OPEN_EAR: f32 = 0.18;

/// Fraction of the open-eye aspect ratio used as the blink threshold
pub const EAR_THRESHOLD_FACTOR: f32 = 0.85;

/// Dwell selection defaults
pub const DEFAULT_DWELL_TIME_MS: u64 = 1200;
pub const DEFAULT_DWELL_RADIUS_PX: f32 = 45.0;
pub const DEFAULT_DWELL_ARM_DELAY_MS: u64 = 150;
pub const DEFAULT_DWELL_COOLDOWN_MS: u64 = 600;

/// Landmarks read by the gesture detectors
pub const LEFT_EYE_OUTER_CORNER: usize = 36;
pub const RIGHT_EYE_OUTER_CORNER: usize = 45;
pub const LEFT_BROW_PEAK: usize = 19;
pub const RIGHT_BROW_PEAK: usize = 24;
pub const LEFT_UPPER_LID: [usize; 2] = [37, 38];
pub const RIGHT_UPPER_LID: [usize; 2] = [43, 44];
pub const MOUTH_LEFT_CORNER: usize = 48;
pub const MOUTH_RIGHT_CORNER: usize = 54;
pub const INNER_LIP_TOP: usize = 62;
pub const INNER_LIP_BOTTOM: usize = 66;

/// Mouth click defaults, ratios of inner-lip gap to mouth width
pub const DEFAULT_MOUTH_ARM_RATIO: f32 = 0.25;
pub const DEFAULT_MOUTH_CLOSE_RATIO: f32 = 0.05;
pub const DEFAULT_MOUTH_COOLDOWN_MS: u64 = 350;
pub const DEFAULT_DOUBLE_CLICK_WINDOW_MS: u64 = 1800;
pub const DEFAULT_RIGHT_CLICK_HOLD_MS: u64 = 700;

/// Brow scroll defaults, in units of the outer eye corner distance
pub const DEFAULT_BROW_UP_THRESHOLD: f32 = 0.010;
pub const DEFAULT_BROW_DOWN_THRESHOLD: f32 = 0.012;
pub const DEFAULT_BROW_WINDOW: usize = 5;
pub const DEFAULT_BROW_BASELINE_ALPHA: f32 = 0.02;
pub const DEFAULT_BROW_REPEAT_MS: u64 = 90;

/// Lip scroll mode defaults
pub const DEFAULT_PUCKER_RATIO: f32 = 0.62;
pub const DEFAULT_LIPS_CLOSED_RATIO: f32 = 0.05;
pub const DEFAULT_LIP_TOGGLE_HOLD_MS: u64 = 550;
pub const DEFAULT_LIP_REPEAT_MS: u64 = 100;
pub const DEFAULT_LIP_GAZE_THRESHOLD: f32 = 0.2;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
