//! End-to-end tracking on rendered frame sequences

mod test_helpers;

use gaze_tracking::backend::DetectorBackend;
use gaze_tracking::config::Config;
use gaze_tracking::face_detection::FaceRegion;
use gaze_tracking::filters::FilterKind;
use gaze_tracking::gesture::MouthGesture;
use gaze_tracking::mark_detection::{mean_shape_in, FaceLandmarks, LandmarkDetector};
use gaze_tracking::session::{DeviceRegistry, FramePipeline, SessionState, TrackingSession, TrackingSnapshot};
use gaze_tracking::source::{DeviceId, Frame, FrameSource};
use gaze_tracking::validity::DetectionMiss;
use gaze_tracking::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_helpers::{frame, synthetic_backend, FaceScene, ScriptedSource, SyntheticFaceDetector};

fn pipeline(config: &Config) -> FramePipeline {
    FramePipeline::new(config, synthetic_backend().unwrap()).unwrap()
}

fn scenario() -> Vec<FaceScene> {
    let mut scenes = vec![FaceScene::looking(0.0, 0.0); 30];
    scenes.extend(vec![FaceScene::closed_eyes(); 30]);
    scenes.push(FaceScene::no_face());
    scenes
}

#[test]
fn test_open_closed_no_face_sequence() {
    let config = Config::default();
    let mut pipeline = pipeline(&config);
    let snapshots: Vec<TrackingSnapshot> = scenario()
        .iter()
        .zip(0u64..)
        .map(|(scene, sequence)| pipeline.process(&frame(scene, sequence)).unwrap())
        .collect();

    for snapshot in &snapshots[..30] {
        assert!(snapshot.valid);
        assert_eq!(snapshot.state, SessionState::Running);
        let gaze = snapshot.gaze.unwrap();
        assert!(gaze.offset.x.abs() < 0.05 && gaze.offset.y.abs() < 0.1, "{:?}", gaze.offset);
        assert!(snapshot.left_pupil.is_some() && snapshot.right_pupil.is_some());
    }
    let last_open = snapshots[29].gaze.unwrap();

    let mut previous = last_open.confidence;
    for snapshot in &snapshots[30..60] {
        assert!(!snapshot.valid);
        assert_eq!(snapshot.state, SessionState::Degraded);
        assert_eq!(snapshot.miss, Some(DetectionMiss::BothEyesInvalid));
        assert!(snapshot.face.is_some());
        let gaze = snapshot.gaze.unwrap();
        assert_eq!(gaze.offset, last_open.offset);
        assert!(gaze.confidence < previous);
        previous = gaze.confidence;
    }

    let lost = &snapshots[60];
    assert_eq!(lost.state, SessionState::Degraded);
    assert_eq!(lost.miss, Some(DetectionMiss::NoFace));
    assert!(lost.face.is_none());
    assert!(lost.gaze.unwrap().confidence < previous);
    assert_eq!(lost.frames_processed, 61);
}

#[test]
fn test_gaze_follows_iris() {
    let config = Config::default();
    let offset_of = |dx: f32| {
        let mut pipeline = pipeline(&config);
        pipeline
            .process(&frame(&FaceScene::looking(dx, 0.0), 0))
            .and_then(|s| s.gaze)
            .unwrap()
            .offset
            .x
    };
    let left = offset_of(-2.5);
    let centre = offset_of(0.0);
    let right = offset_of(2.5);
    assert!(left < centre && centre < right, "{left} {centre} {right}");
    // 2.5 px over a ~23 px half width
    assert!((right - 0.11).abs() < 0.05);
}

#[test]
fn test_constant_scene_converges_exactly() {
    for filter in [FilterKind::MovingAverage, FilterKind::Median, FilterKind::Exponential, FilterKind::Kalman] {
        let mut config = Config::default();
        config.smoothing.filter = filter;
        let mut pipeline = pipeline(&config);
        let scene = FaceScene::looking(1.0, 0.5);

        let raw = pipeline.process(&frame(&scene, 0)).unwrap().gaze.unwrap();
        let mut last = raw;
        for sequence in 1..20 {
            last = pipeline.process(&frame(&scene, sequence)).unwrap().gaze.unwrap();
        }
        assert_eq!(last, raw, "{filter}");
        assert!(pipeline.tracking_state().history().is_fixating());
    }
}

#[test]
fn test_out_of_order_frames_are_dropped() {
    let mut pipeline = pipeline(&Config::default());
    let scene = FaceScene::default();
    assert!(pipeline.process(&frame(&scene, 5)).is_some());
    assert!(pipeline.process(&frame(&scene, 5)).is_none());
    assert!(pipeline.process(&frame(&scene, 3)).is_none());
    assert_eq!(pipeline.tracking_state().frames_processed(), 1);
    assert!(pipeline.process(&frame(&scene, 6)).is_some());
}

/// Mean-shape landmarks with the mouth open on a range of frames
struct MouthScript {
    open: std::ops::Range<u64>,
}

impl LandmarkDetector for MouthScript {
    fn detect(&mut self, frame: &Frame, face: &FaceRegion) -> Result<Option<FaceLandmarks>> {
        let mut points = mean_shape_in(face.bbox());
        let width = points[54].x - points[48].x;
        let gap = if self.open.contains(&frame.sequence()) { 0.4 * width } else { 0.0 };
        points[66].y = points[62].y + gap;
        FaceLandmarks::new(points).map(Some)
    }

    fn name(&self) -> &str {
        "MouthScript"
    }
}

#[test]
fn test_mouth_gesture_reaches_snapshots() {
    let mut config = Config::default();
    config.gesture.enabled = true;
    let backend = DetectorBackend::new(Box::new(SyntheticFaceDetector), Box::new(MouthScript { open: 3..6 }));
    let mut pipeline = FramePipeline::new(&config, backend).unwrap();

    let snapshots: Vec<TrackingSnapshot> = (0..30)
        .map(|sequence| pipeline.process(&frame(&FaceScene::default(), sequence)).unwrap())
        .collect();

    let clicks: Vec<_> = snapshots
        .iter()
        .filter_map(|s| s.mouth.map(|event| (s.sequence, event.gesture)))
        .collect();
    assert_eq!(clicks, vec![(6, MouthGesture::Click)]);
    // A steady face neither scrolls nor toggles the lip mode
    assert!(snapshots.iter().all(|s| s.scrolls.is_empty() && !s.scroll_mode));
    assert!(snapshots.iter().all(|s| s.valid));
}

#[test]
fn test_gestures_are_off_by_default() {
    let backend = DetectorBackend::new(Box::new(SyntheticFaceDetector), Box::new(MouthScript { open: 3..6 }));
    let mut pipeline = FramePipeline::new(&Config::default(), backend).unwrap();
    for sequence in 0..10 {
        let snapshot = pipeline.process(&frame(&FaceScene::default(), sequence)).unwrap();
        assert!(snapshot.mouth.is_none());
    }
}

fn scripted_session(source: ScriptedSource) -> TrackingSession {
    let source = Mutex::new(Some(source));
    let provider = move |device: &DeviceId| -> Result<Box<dyn FrameSource>> {
        source
            .lock()
            .unwrap()
            .take()
            .map(|s| Box::new(s) as Box<dyn FrameSource>)
            .ok_or_else(|| gaze_tracking::Error::DeviceUnavailable(device.to_string()))
    };
    TrackingSession::new(
        Config::default(),
        Arc::new(synthetic_backend),
        Arc::new(provider),
        DeviceRegistry::new(),
    )
    .unwrap()
}

fn drain_until_stopped(session: &TrackingSession) -> Vec<TrackingSnapshot> {
    let mut updates = session.subscribe();
    session.start().unwrap();
    let mut seen = Vec::new();
    while let Some(snapshot) = updates.wait_next(Duration::from_secs(10)) {
        let stopped = snapshot.state == SessionState::Stopped;
        seen.push(snapshot);
        if stopped {
            break;
        }
    }
    seen
}

#[test]
fn test_session_runs_scenario_to_end_of_stream() {
    let mut source = ScriptedSource::from_scenes(DeviceId::Index(0), &scenario());
    source.interval = Duration::from_millis(1);
    let session = scripted_session(source);

    let seen = drain_until_stopped(&session);
    let last = seen.last().unwrap();
    assert_eq!(last.state, SessionState::Stopped);
    assert_eq!(last.frames_processed, 61);
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.last_error().is_none());

    // Observed snapshots are in order, confidence never rises once degraded
    assert!(seen.windows(2).all(|w| w[0].sequence <= w[1].sequence));
    let degraded: Vec<f32> = seen
        .iter()
        .filter(|s| s.state == SessionState::Degraded)
        .map(|s| s.confidence)
        .collect();
    assert!(degraded.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn test_session_disconnect_is_fatal() {
    let mut source = ScriptedSource::from_scenes(DeviceId::Index(0), &[FaceScene::default(); 5]);
    source.disconnect_at_end = true;
    let session = scripted_session(source);

    let seen = drain_until_stopped(&session);
    assert_eq!(seen.last().unwrap().state, SessionState::Stopped);
    assert!(matches!(
        session.last_error().as_deref(),
        Some(gaze_tracking::Error::DeviceUnavailable(_))
    ));
}
