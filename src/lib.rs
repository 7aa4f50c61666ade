//! Webcam gaze tracking library.
//!
//! The pipeline runs one grayscale frame at a time through these stages:
//! 1. Face location (pluggable detector backend)
//! 2. Eye region extraction from 68-point facial landmarks
//! 3. Pupil localisation inside each eye opening
//! 4. Gaze estimation from pupil offsets, optionally mapped to the screen
//!    through a calibration
//! 5. Temporal smoothing and degraded-mode handling in a
//!    [`session::TrackingSession`]
//!
//! Every derived entity carries a [`validity::Validity`] flag. A stage that
//! cannot produce a result marks its output invalid with the reason, and the
//! stages after it propagate that instead of failing.
//!
//! # Examples
//!
//! ## Running a session
//!
//! ```no_run
//! use gaze_tracking::config::Config;
//! use gaze_tracking::session::{SessionState, TrackingSession};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("config.yaml")?;
//! let session = TrackingSession::from_config(config)?;
//! let mut updates = session.subscribe();
//! session.start()?;
//!
//! while let Some(snapshot) = updates.wait_next(Duration::from_secs(1)) {
//!     if let Some(gaze) = snapshot.gaze {
//!         println!("offset {:?} confidence {:.2}", gaze.offset, gaze.confidence);
//!     }
//!     if snapshot.state == SessionState::Stopped {
//!         break;
//!     }
//! }
//! session.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Processing frames directly
//!
//! ```no_run
//! use gaze_tracking::backend::DetectorBackend;
//! use gaze_tracking::config::Config;
//! use gaze_tracking::session::FramePipeline;
//! use gaze_tracking::source::Frame;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let backend = DetectorBackend::from_config(&config.detection)?;
//! let mut pipeline = FramePipeline::new(&config, backend)?;
//!
//! let image = image::open("face.png")?.to_luma8();
//! let frame = Frame::new(image, Duration::ZERO, 0);
//! if let Some(snapshot) = pipeline.process(&frame) {
//!     println!("valid: {} left pupil: {:?}", snapshot.valid, snapshot.left_pupil);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using Filters
//!
//! ```no_run
//! use gaze_tracking::filters::parse_filter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut filter = parse_filter("exponential:0.4")?;
//! let (x, y) = filter.apply(0.12, -0.05);
//! println!("Filtered offset: ({x:.3}, {y:.3})");
//! filter.reset();
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the library
pub mod constants;

/// Points, rectangles and polygons in frame coordinates
pub mod geometry;

pub mod validity;

/// Utility functions for image processing and numeric conversion
pub mod utils;

pub mod slot;

/// Frame sources: cameras, image sequences and pushed frames
pub mod source;

/// Face detection module for finding faces in images
pub mod face_detection;

/// Facial landmark detection module for finding 68 key points
pub mod mark_detection;

pub mod eye_region;

/// Pupil localisation inside an eye opening
pub mod pupil;

pub mod gaze;

/// Offset-to-screen calibration maps
pub mod calibration;

/// Signal filtering algorithms for smoothing gaze estimates
pub mod filters;

pub mod history;

pub mod blink;

pub mod dwell;

/// Mouth clicks and brow or lip scrolling from face landmarks
pub mod gesture;

/// Detector backend selection
pub mod backend;

/// Configuration management
pub mod config;

/// Tracking session and per-frame pipeline
pub mod session;

pub use error::{Error, Result};
pub use session::{SessionState, TrackingSession, TrackingSnapshot};
