//! Helper functions and utilities for tests: a synthetic face renderer and
//! scripted frame sources.

#![allow(dead_code)]

use gaze_tracking::backend::DetectorBackend;
use gaze_tracking::eye_region::EyeSide;
use gaze_tracking::face_detection::{FaceCandidate, FaceDetector};
use gaze_tracking::geometry::{polygon_contains, Point, Rect};
use gaze_tracking::mark_detection::{mean_shape_in, FaceLandmarks, MeanShapeLandmarker};
use gaze_tracking::source::{DeviceId, Frame, FrameSource};
use gaze_tracking::{Error, Result};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;
pub const FACE: Rect = Rect::new(170.0, 90.0, 300.0, 300.0);

pub const BACKGROUND: f32 = 90.0;
pub const SKIN: f32 = 180.0;
pub const SCLERA: f32 = 230.0;
pub const IRIS: f32 = 40.0;
pub const IRIS_RADIUS: f32 = 4.5;

/// How the synthetic face looks in one frame
#[derive(Debug, Clone, Copy)]
pub struct FaceScene {
    /// Iris displacement from each eye's centre, in pixels
    pub gaze_shift: Point,
    pub eyes_open: bool,
    pub face_visible: bool,
    /// Multiplier applied to every intensity
    pub gain: f32,
    /// Amplitude of uniform per-pixel noise
    pub noise: f32,
    pub seed: u64,
}

impl Default for FaceScene {
    fn default() -> Self {
        Self {
            gaze_shift: Point::new(0.0, 0.0),
            eyes_open: true,
            face_visible: true,
            gain: 1.0,
            noise: 0.0,
            seed: 7,
        }
    }
}

impl FaceScene {
    pub fn looking(dx: f32, dy: f32) -> Self {
        Self {
            gaze_shift: Point::new(dx, dy),
            ..Self::default()
        }
    }

    pub fn closed_eyes() -> Self {
        Self {
            eyes_open: false,
            ..Self::default()
        }
    }

    pub fn no_face() -> Self {
        Self {
            face_visible: false,
            ..Self::default()
        }
    }
}

/// Eye contours of the synthetic face, frame coordinates
pub fn eye_contours() -> [[Point; 6]; 2] {
    let landmarks = FaceLandmarks::new(mean_shape_in(&FACE)).expect("mean shape has 68 points");
    [landmarks.eye_contour(EyeSide::Left), landmarks.eye_contour(EyeSide::Right)]
}

/// Eye centre as the gaze estimator defines it
pub fn eye_center(contour: &[Point; 6]) -> Point {
    let upper = (contour[1].y + contour[2].y) / 2.0;
    let lower = (contour[4].y + contour[5].y) / 2.0;
    Point::new((contour[0].x + contour[3].x) / 2.0, (upper + lower) / 2.0)
}

/// Iris centres (left, right) for a scene
pub fn iris_centers(scene: &FaceScene) -> (Point, Point) {
    let [left, right] = eye_contours();
    let shift = |c: Point| c.offset(scene.gaze_shift.x, scene.gaze_shift.y);
    (shift(eye_center(&left)), shift(eye_center(&right)))
}

pub fn render(scene: &FaceScene) -> GrayImage {
    let contours = eye_contours();
    let (left_iris, right_iris) = iris_centers(scene);
    let irises = [left_iris, right_iris];
    let mut rng = StdRng::seed_from_u64(scene.seed);

    GrayImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        let centre = Point::new(x as f32 + 0.5, y as f32 + 0.5);
        let mut value = BACKGROUND;
        if scene.face_visible && FACE.contains_point(&centre) {
            value = SKIN;
            if scene.eyes_open {
                for (contour, iris) in contours.iter().zip(irises.iter()) {
                    if polygon_contains(contour, &centre) {
                        value = if centre.distance(iris) <= IRIS_RADIUS { IRIS } else { SCLERA };
                    }
                }
            }
        }
        let noise = if scene.noise > 0.0 {
            rng.gen_range(-scene.noise..=scene.noise)
        } else {
            0.0
        };
        Luma([(value * scene.gain + noise).round().clamp(0.0, 255.0) as u8])
    })
}

pub fn frame(scene: &FaceScene, sequence: u64) -> Frame {
    Frame::new(render(scene), frame_time(sequence), sequence)
}

/// 30 fps timestamps
pub fn frame_time(sequence: u64) -> Duration {
    Duration::from_micros(33_333 * (sequence + 1))
}

/// Reports the synthetic face only when its area is lit like skin
#[derive(Debug, Clone)]
pub struct SyntheticFaceDetector;

impl FaceDetector for SyntheticFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceCandidate>> {
        let centre = FACE.center();
        let value = frame.image().get_pixel(centre.x as u32, centre.y as u32)[0];
        if f32::from(value) > (BACKGROUND + SKIN) / 2.0 {
            Ok(vec![FaceCandidate::new(FACE, 0.95)])
        } else {
            Ok(Vec::new())
        }
    }

    fn name(&self) -> &str {
        "SyntheticFaceDetector"
    }
}

pub fn synthetic_backend() -> Result<DetectorBackend> {
    Ok(DetectorBackend::new(
        Box::new(SyntheticFaceDetector),
        Box::new(MeanShapeLandmarker),
    ))
}

/// Frame source replaying a fixed list of frames, then ending the stream
pub struct ScriptedSource {
    device: DeviceId,
    frames: VecDeque<Frame>,
    /// Pause before each frame
    pub interval: Duration,
    /// Report a disconnect instead of end-of-stream when exhausted
    pub disconnect_at_end: bool,
}

impl ScriptedSource {
    pub fn new(device: DeviceId, frames: Vec<Frame>) -> Self {
        Self {
            device,
            frames: frames.into(),
            interval: Duration::ZERO,
            disconnect_at_end: false,
        }
    }

    pub fn from_scenes(device: DeviceId, scenes: &[FaceScene]) -> Self {
        let frames = scenes
            .iter()
            .zip(0u64..)
            .map(|(scene, sequence)| frame(scene, sequence))
            .collect();
        Self::new(device, frames)
    }
}

impl FrameSource for ScriptedSource {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.disconnect_at_end => Err(Error::DeviceUnavailable(format!("{}: unplugged", self.device))),
            None => Ok(None),
        }
    }
}

/// Source that never delivers a frame
pub struct IdleSource(pub DeviceId);

impl FrameSource for IdleSource {
    fn device(&self) -> &DeviceId {
        &self.0
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        std::thread::sleep(timeout);
        Err(Error::FrameTimeout)
    }
}
