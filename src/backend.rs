//! Detector backend selection.
//!
//! A backend bundles the two model capabilities the pipeline needs: locating
//! faces and extracting landmarks. The concrete implementations are chosen
//! from configuration and never leak into the pipeline code.

use crate::config::{BackendKind, DetectionConfig};
use crate::face_detection::{FaceDetector, StaticFaceDetector};
use crate::geometry::Rect;
use crate::mark_detection::{LandmarkDetector, MeanShapeLandmarker};
use crate::Result;
use log::info;

/// Face detector plus landmark detector
pub struct DetectorBackend {
    pub face: Box<dyn FaceDetector>,
    pub landmarks: Box<dyn LandmarkDetector>,
}

impl DetectorBackend {
    #[must_use]
    pub fn new(face: Box<dyn FaceDetector>, landmarks: Box<dyn LandmarkDetector>) -> Self {
        Self { face, landmarks }
    }

    /// Build the backend named in the detection configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a model cannot be loaded or the backend was not
    /// compiled in
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Static => {
                let region = config
                    .face_region
                    .unwrap_or(Rect::new(0.0, 0.0, f32::INFINITY, f32::INFINITY));
                Self::new(
                    Box::new(StaticFaceDetector::new(region, config.static_score)),
                    Box::new(MeanShapeLandmarker),
                )
            }
            BackendKind::Onnx => onnx_backend(config)?,
        };
        info!(
            "Using detector backend {} + {}",
            backend.face.name(),
            backend.landmarks.name()
        );
        Ok(backend)
    }
}

#[cfg(feature = "onnx")]
fn onnx_backend(config: &DetectionConfig) -> Result<DetectorBackend> {
    use crate::face_detection::scrfd::ScrfdDetector;
    use crate::mark_detection::onnx::OnnxLandmarker;

    Ok(DetectorBackend::new(
        Box::new(ScrfdDetector::new(&config.face_model, config.nms_threshold)?),
        Box::new(OnnxLandmarker::new(&config.landmark_model)?),
    ))
}

#[cfg(not(feature = "onnx"))]
fn onnx_backend(_config: &DetectionConfig) -> Result<DetectorBackend> {
    Err(crate::Error::ConfigError(
        "The onnx backend requires building with the `onnx` feature".to_string(),
    ))
}

/// Creates a fresh backend each time a session starts
pub trait BackendFactory: Send + Sync {
    /// # Errors
    ///
    /// Backend construction failures
    fn create(&self) -> Result<DetectorBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<DetectorBackend> + Send + Sync,
{
    fn create(&self) -> Result<DetectorBackend> {
        self()
    }
}

/// Factory building backends from a detection configuration
#[derive(Debug, Clone)]
pub struct ConfigBackendFactory {
    config: DetectionConfig,
}

impl ConfigBackendFactory {
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for ConfigBackendFactory {
    fn create(&self) -> Result<DetectorBackend> {
        DetectorBackend::from_config(&self.config)
    }
}
