use super::{DeviceId, Frame, FrameSource};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays the images of a directory, in file name order, as a capture device.
///
/// Frames are timestamped at a nominal frame rate. Unreadable files are
/// skipped with a warning; a directory that disappears mid-replay is
/// reported as a lost device.
pub struct ImageSequenceSource {
    device: DeviceId,
    root: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    frame_interval: Duration,
    sequence: u64,
}

impl ImageSequenceSource {
    /// Open a directory of frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the directory cannot be listed
    /// or holds no images, and [`Error::InvalidInput`] for a non-positive rate.
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !(fps.is_finite() && fps > 0.0) {
            return Err(Error::InvalidInput(format!("Frame rate must be positive, got {fps}")));
        }

        let entries = std::fs::read_dir(&root)
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {e}", root.display())))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::DeviceUnavailable(format!(
                "{}: no image files found",
                root.display()
            )));
        }

        info!("Opened image sequence {} ({} frames)", root.display(), files.len());

        Ok(Self {
            device: DeviceId::Uri(root.to_string_lossy().into_owned()),
            root,
            files,
            position: 0,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            sequence: 0,
        })
    }

    /// Number of frames not yet delivered
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.files.len() - self.position
    }
}

impl FrameSource for ImageSequenceSource {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        while self.position < self.files.len() {
            if !self.root.is_dir() {
                return Err(Error::DeviceUnavailable(format!(
                    "{} disappeared during replay",
                    self.root.display()
                )));
            }

            let path = &self.files[self.position];
            let index = self.position;
            self.position += 1;

            match image::open(path) {
                Ok(decoded) => {
                    let timestamp = self.frame_interval * u32::try_from(index).unwrap_or(u32::MAX);
                    let frame = Frame::from_dynamic(&decoded, timestamp, self.sequence);
                    self.sequence += 1;
                    debug!("Loaded frame {} from {}", frame.sequence(), path.display());
                    return Ok(Some(frame));
                }
                Err(e) => warn!("Skipping unreadable frame {}: {}", path.display(), e),
            }
        }
        Ok(None)
    }
}
