//! Pupil localisation on rendered faces

mod test_helpers;

use gaze_tracking::eye_region::EyeRegionExtractor;
use gaze_tracking::face_detection::FaceRegion;
use gaze_tracking::mark_detection::MeanShapeLandmarker;
use gaze_tracking::pupil::{PupilEstimate, PupilEstimator};
use gaze_tracking::validity::DetectionMiss;
use test_helpers::{frame, iris_centers, FaceScene, FACE};

fn estimate(scene: &FaceScene) -> (PupilEstimate, PupilEstimate) {
    let frame = frame(scene, 0);
    let face = FaceRegion::valid(FACE, 0.95, frame.sequence());
    let mut extractor = EyeRegionExtractor::with_default_margin(Box::new(MeanShapeLandmarker));
    let eyes = extractor.extract(&frame, &face);
    assert!(eyes.left.is_valid() && eyes.right.is_valid());

    let estimator = PupilEstimator::default();
    (estimator.estimate(&eyes.left), estimator.estimate(&eyes.right))
}

#[test]
fn test_pupil_within_one_pixel() {
    let shifts = [(-2.5, 0.0), (0.0, 0.0), (2.5, 0.0), (0.0, -1.0), (1.3, 0.7)];
    let lighting = [(1.0, 0.0), (0.5, 0.0), (1.1, 6.0), (0.8, 10.0)];

    for (dx, dy) in shifts {
        for (seed, (gain, noise)) in (0u64..).zip(lighting) {
            let scene = FaceScene {
                gain,
                noise,
                seed,
                ..FaceScene::looking(dx, dy)
            };
            let (left, right) = estimate(&scene);
            let (left_iris, right_iris) = iris_centers(&scene);

            for (estimate, truth) in [(left, left_iris), (right, right_iris)] {
                assert!(estimate.is_valid(), "{scene:?}: {:?}", estimate.validity());
                let error = estimate.frame_position().distance(&truth);
                assert!(error <= 1.0, "{scene:?}: error {error:.2} px");
                assert!(estimate.confidence() > 0.0);
            }
        }
    }
}

#[test]
fn test_closed_eyes_are_low_contrast() {
    let (left, right) = estimate(&FaceScene::closed_eyes());
    assert_eq!(left.validity().miss(), Some(DetectionMiss::LowContrast));
    assert_eq!(right.validity().miss(), Some(DetectionMiss::LowContrast));
}

#[test]
fn test_same_frame_same_estimate() {
    let scene = FaceScene {
        noise: 8.0,
        ..FaceScene::looking(1.0, 0.5)
    };
    assert_eq!(estimate(&scene), estimate(&scene));
}
