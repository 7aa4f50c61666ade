//! Error types for the gaze tracking library.
//!
//! Only resource failures travel through [`Error`]. Per-frame detection
//! quality problems are never errors: they are carried downstream as
//! [`crate::validity::DetectionMiss`] values inside the pipeline entities.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// The capture device is missing, disconnected or failed mid-stream (fatal)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The capture device is already owned by another session (fatal at start)
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// No frame arrived within the caller's timeout
    #[error("Timed out waiting for a frame")]
    FrameTimeout,

    /// A screen mapping was requested but no calibration is loaded
    #[error("No calibration loaded")]
    CalibrationMissing,

    /// Calibration fitting or loading failed
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Filter initialization error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation not allowed in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (calibration file) encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OpenCV` operation failed
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),
}

impl Error {
    /// Whether this error ends a running session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::DeviceBusy(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
