use super::{FaceLandmarks, LandmarkDetector};
use crate::constants::{LANDMARK_INPUT_SIZE, NUM_FACIAL_LANDMARKS};
use crate::face_detection::FaceRegion;
use crate::geometry::Point;
use crate::source::Frame;
use crate::utils::image_ops::crop;
use crate::utils::refine_box;
use crate::{Error, Result};
use image::imageops::{self, FilterType};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::path::Path;
use std::sync::Arc;

/// Context added around the detector box before cropping
const FACE_BOX_SHIFT: f32 = 0.1;

/// Facial landmark regressor using `ONNX` Runtime.
///
/// Expects an NHWC float input of `LANDMARK_INPUT_SIZE` squared RGB pixels
/// in [0, 1] and returns 136 values in input pixel units.
pub struct OnnxLandmarker {
    session: Session,
    input_size: u32,
}

impl OnnxLandmarker {
    /// Create a new landmark detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or has no outputs
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!("Initializing OnnxLandmarker with model: {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("mark_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.outputs.is_empty() {
            return Err(Error::ModelError("Model has no outputs".to_string()));
        }

        Ok(Self {
            session,
            input_size: LANDMARK_INPUT_SIZE,
        })
    }

    fn preprocess(&self, face: &image::GrayImage) -> Array4<f32> {
        let size = self.input_size;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let value = f32::from(pixel[0]) / 255.0;
            for channel in 0..3 {
                tensor[[0, y as usize, x as usize, channel]] = value;
            }
        }
        tensor
    }

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let marks_output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelError("No output from model".to_string()))?;
        let marks_tensor = marks_output.try_extract::<f32>()?;
        let marks: Vec<f32> = marks_tensor.view().iter().copied().collect();
        Ok(marks)
    }
}

impl LandmarkDetector for OnnxLandmarker {
    #[allow(clippy::cast_precision_loss)]
    fn detect(&mut self, frame: &Frame, face: &FaceRegion) -> Result<Option<FaceLandmarks>> {
        if !face.is_valid() {
            return Ok(None);
        }
        let square = refine_box(face.bbox(), frame.width(), frame.height(), FACE_BOX_SHIFT);
        let Some((patch, bounds)) = crop(frame.image(), &square) else {
            return Ok(None);
        };

        let marks = self.forward(self.preprocess(&patch))?;
        if marks.len() < NUM_FACIAL_LANDMARKS * 2 {
            return Err(Error::ModelError(format!(
                "Expected {} landmark values, got {}",
                NUM_FACIAL_LANDMARKS * 2,
                marks.len()
            )));
        }

        let scale_x = bounds.width / self.input_size as f32;
        let scale_y = bounds.height / self.input_size as f32;
        let points = marks
            .chunks_exact(2)
            .take(NUM_FACIAL_LANDMARKS)
            .map(|xy| Point::new(bounds.x + xy[0] * scale_x, bounds.y + xy[1] * scale_y))
            .collect();
        FaceLandmarks::new(points).map(Some)
    }

    fn name(&self) -> &str {
        "OnnxLandmarker"
    }
}
