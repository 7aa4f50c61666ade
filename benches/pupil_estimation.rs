//! Benchmarks for the per-frame pipeline stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gaze_tracking::backend::DetectorBackend;
use gaze_tracking::config::Config;
use gaze_tracking::eye_region::{EyeRegion, EyeSide};
use gaze_tracking::face_detection::StaticFaceDetector;
use gaze_tracking::geometry::{polygon_contains, Point, Rect};
use gaze_tracking::mark_detection::MeanShapeLandmarker;
use gaze_tracking::pupil::PupilEstimator;
use gaze_tracking::session::FramePipeline;
use gaze_tracking::source::Frame;
use image::{GrayImage, Luma};
use std::time::Duration;

/// Hexagonal eye crop scaled by `scale` with a dark iris in the middle
fn eye(scale: u32) -> EyeRegion {
    let (w, h) = (40 * scale, 24 * scale);
    let s = scale as f32;
    let contour = [
        Point::new(2.0 * s, 12.0 * s),
        Point::new(12.0 * s, 2.0 * s),
        Point::new(28.0 * s, 2.0 * s),
        Point::new(38.0 * s, 12.0 * s),
        Point::new(28.0 * s, 22.0 * s),
        Point::new(12.0 * s, 22.0 * s),
    ];
    let centre = Point::new(20.0 * s, 12.0 * s);
    let image = GrayImage::from_fn(w, h, |x, y| {
        let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
        if !polygon_contains(&contour, &p) {
            Luma([180])
        } else if p.distance(&centre) <= 4.0 * s {
            Luma([35])
        } else {
            Luma([225])
        }
    });
    EyeRegion::new(EyeSide::Left, image, Rect::new(0.0, 0.0, w as f32, h as f32), contour)
}

fn benchmark_pupil(c: &mut Criterion) {
    let mut group = c.benchmark_group("pupil_estimation");
    let estimator = PupilEstimator::default();

    for scale in [1, 2, 4] {
        let region = eye(scale);
        group.bench_with_input(BenchmarkId::new("estimate", scale), &region, |b, region| {
            b.iter(|| black_box(estimator.estimate(black_box(region))));
        });
    }

    group.finish();
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_pipeline");
    let face = Rect::new(170.0, 90.0, 300.0, 300.0);
    let backend = DetectorBackend::new(
        Box::new(StaticFaceDetector::new(face, 1.0)),
        Box::new(MeanShapeLandmarker),
    );
    let mut pipeline = FramePipeline::new(&Config::default(), backend).unwrap();
    let image = GrayImage::from_pixel(640, 480, Luma([128]));
    let mut sequence = 0u64;

    group.bench_function("process_640x480", |b| {
        b.iter(|| {
            sequence += 1;
            let frame = Frame::new(image.clone(), Duration::from_millis(sequence), sequence);
            black_box(pipeline.process(&frame))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_pupil, benchmark_pipeline);
criterion_main!(benches);
