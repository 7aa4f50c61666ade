use super::{FaceCandidate, FaceDetector};
use crate::constants::{IMAGE_NORMALIZATION_OFFSET, IMAGE_NORMALIZATION_SCALE};
use crate::geometry::Rect;
use crate::source::Frame;
use crate::{Error, Result};
use image::imageops::{self, FilterType};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Default SCRFD input resolution when the model leaves it dynamic
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates scoring below this never leave the backend
const DEFAULT_SCORE_FLOOR: f32 = 0.3;

/// SCRFD face detector (anchor-free, multi-stride) on ONNX Runtime
pub struct ScrfdDetector {
    session: Session,
    input_size: (u32, u32),
    score_floor: f32,
    nms_threshold: f32,
    num_anchors: usize,
    strides: Vec<u32>,
    offset: usize,
    center_cache: HashMap<(u32, u32, u32), Vec<(f32, f32)>>,
}

impl ScrfdDetector {
    /// Load an SCRFD model; the output layout (3 or 5 strides, with or
    /// without keypoints) is inferred from the number of model outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or has no inputs
    pub fn new<P: AsRef<Path>>(model_path: P, nms_threshold: f32) -> Result<Self> {
        log::info!("Loading SCRFD face detector from {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input_meta = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelError("Model has no inputs".to_string()))?;
        let dims = &input_meta.dimensions;
        let input_size = if dims.len() >= 4 {
            (
                dims[3].unwrap_or(DEFAULT_INPUT_SIZE),
                dims[2].unwrap_or(DEFAULT_INPUT_SIZE),
            )
        } else {
            (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
        };

        let (offset, strides, num_anchors) = match session.outputs.len() {
            6 | 9 => (3, vec![8, 16, 32], 2),
            10 | 15 => (5, vec![8, 16, 32, 64, 128], 1),
            n => {
                log::warn!("Unknown SCRFD layout with {} outputs, assuming 3 strides", n);
                (3, vec![8, 16, 32], 2)
            }
        };

        Ok(Self {
            session,
            input_size,
            score_floor: DEFAULT_SCORE_FLOOR,
            nms_threshold,
            num_anchors,
            strides,
            offset,
            center_cache: HashMap::new(),
        })
    }

    /// Letterbox the frame into the model input and normalize it (NCHW).
    /// Returns the tensor and the scale from frame to model pixels.
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    fn preprocess(&self, frame: &Frame) -> (Array4<f32>, f32) {
        let (input_w, input_h) = self.input_size;
        let scale = (input_w as f32 / frame.width() as f32).min(input_h as f32 / frame.height() as f32);
        let new_w = ((frame.width() as f32 * scale) as u32).clamp(1, input_w);
        let new_h = ((frame.height() as f32 * scale) as u32).clamp(1, input_h);
        let resized = imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);

        let mut tensor = Array4::<f32>::from_elem(
            (1, 3, input_h as usize, input_w as usize),
            -IMAGE_NORMALIZATION_OFFSET / IMAGE_NORMALIZATION_SCALE,
        );
        for (x, y, pixel) in resized.enumerate_pixels() {
            let value = (f32::from(pixel[0]) - IMAGE_NORMALIZATION_OFFSET) / IMAGE_NORMALIZATION_SCALE;
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = value;
            }
        }
        (tensor, scale)
    }

    fn anchor_centers(&mut self, height: u32, width: u32, stride: u32) -> Vec<(f32, f32)> {
        let num_anchors = self.num_anchors;
        self.center_cache
            .entry((height, width, stride))
            .or_insert_with(|| {
                let mut centers = Vec::with_capacity((height * width) as usize * num_anchors);
                for y in 0..height {
                    for x in 0..width {
                        #[allow(clippy::cast_precision_loss)]
                        let center = ((x * stride) as f32, (y * stride) as f32);
                        centers.extend(std::iter::repeat(center).take(num_anchors));
                    }
                }
                centers
            })
            .clone()
    }

    fn nms(&self, mut candidates: Vec<FaceCandidate>) -> Vec<FaceCandidate> {
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let mut keep: Vec<FaceCandidate> = Vec::new();
        for candidate in candidates {
            if keep.iter().all(|kept| kept.bbox.iou(&candidate.bbox) <= self.nms_threshold) {
                keep.push(candidate);
            }
        }
        keep
    }
}

impl FaceDetector for ScrfdDetector {
    #[allow(clippy::cast_precision_loss)]
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceCandidate>> {
        let (tensor, scale) = self.preprocess(frame);
        let (input_w, input_h) = self.input_size;

        let cow_array = CowArray::from(tensor.into_dyn());
        let input = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input])?;

        let mut candidates = Vec::new();
        for (idx, stride) in self.strides.clone().into_iter().enumerate() {
            let scores_tensor = outputs[idx].try_extract::<f32>()?;
            let scores: Vec<f32> = scores_tensor.view().iter().copied().collect();
            let bbox_tensor = outputs[idx + self.offset].try_extract::<f32>()?;
            let distances: Vec<f32> = bbox_tensor.view().iter().map(|d| d * stride as f32).collect();

            let centers = self.anchor_centers(input_h / stride, input_w / stride, stride);
            if distances.len() < centers.len() * 4 || scores.len() < centers.len() {
                return Err(Error::ModelError(format!(
                    "Stride {stride}: output shorter than {} anchors",
                    centers.len()
                )));
            }

            for (i, &(cx, cy)) in centers.iter().enumerate() {
                let score = scores[i];
                if score < self.score_floor {
                    continue;
                }
                let d = &distances[i * 4..i * 4 + 4];
                let (x1, y1, x2, y2) = (cx - d[0], cy - d[1], cx + d[2], cy + d[3]);
                candidates.push(FaceCandidate::new(
                    Rect::new(x1 / scale, y1 / scale, (x2 - x1) / scale, (y2 - y1) / scale),
                    score,
                ));
            }
        }

        Ok(self.nms(candidates))
    }

    fn name(&self) -> &str {
        "ScrfdDetector"
    }
}
