//! Frame acquisition.
//!
//! A [`FrameSource`] wraps one capture device and yields timestamped
//! grayscale [`Frame`]s. Sources never buffer more than one frame: when the
//! consumer falls behind, older frames are dropped so the freshest one is
//! always delivered next.

/// Replay of an image directory as a capture device
pub mod sequence;

/// Frames pushed in by an external capture callback
pub mod push;

/// Live capture through `OpenCV`
#[cfg(feature = "opencv")]
pub mod camera;

use crate::{Error, Result};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use push::{FramePusher, PushFrameSource};
pub use sequence::ImageSequenceSource;

/// Capture device identifier: a camera index or a URI / path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    Index(u32),
    Uri(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "camera:{index}"),
            Self::Uri(uri) => f.write_str(uri),
        }
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::Index(0)
    }
}

/// An immutable grayscale frame with its capture time and sequence index.
///
/// Cloning shares the underlying raster.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<GrayImage>,
    timestamp: Duration,
    sequence: u64,
}

impl Frame {
    #[must_use]
    pub fn new(image: GrayImage, timestamp: Duration, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
            sequence,
        }
    }

    /// Build a frame from any decoded image, converting it to 8-bit luma
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage, timestamp: Duration, sequence: u64) -> Self {
        Self::new(image.to_luma8(), timestamp, sequence)
    }

    #[must_use]
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A capture device producing frames in strictly increasing timestamp order
pub trait FrameSource: Send {
    /// Device this source reads from
    fn device(&self) -> &DeviceId;

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameTimeout`] when no frame arrives in time (non-fatal)
    /// - [`Error::DeviceUnavailable`] when the device is gone (fatal)
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>>;
}

/// Opens frame sources for devices; the session acquires its device through this
pub trait SourceProvider: Send + Sync {
    /// Open the device
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the device cannot be opened
    fn open(&self, device: &DeviceId) -> Result<Box<dyn FrameSource>>;
}

impl<F> SourceProvider for F
where
    F: Fn(&DeviceId) -> Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self, device: &DeviceId) -> Result<Box<dyn FrameSource>> {
        self(device)
    }
}

/// Resolves directories to [`ImageSequenceSource`] and everything else to
/// the `OpenCV` camera when that feature is enabled.
#[derive(Debug, Clone)]
pub struct DefaultProvider {
    /// Nominal frame rate used to timestamp image sequences
    pub sequence_fps: f64,
}

impl Default for DefaultProvider {
    fn default() -> Self {
        Self {
            sequence_fps: crate::constants::DEFAULT_FPS,
        }
    }
}

impl SourceProvider for DefaultProvider {
    fn open(&self, device: &DeviceId) -> Result<Box<dyn FrameSource>> {
        if let DeviceId::Uri(uri) = device {
            if Path::new(uri).is_dir() {
                return Ok(Box::new(ImageSequenceSource::open(uri, self.sequence_fps)?));
            }
        }
        open_camera(device)
    }
}

#[cfg(feature = "opencv")]
fn open_camera(device: &DeviceId) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(camera::OpenCvCamera::open(device)?))
}

#[cfg(not(feature = "opencv"))]
fn open_camera(device: &DeviceId) -> Result<Box<dyn FrameSource>> {
    Err(Error::DeviceUnavailable(format!(
        "{device}: live capture requires the `opencv` feature"
    )))
}
