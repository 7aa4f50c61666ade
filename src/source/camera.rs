use super::{DeviceId, Frame, FrameSource};
use crate::{Error, Result};
use image::GrayImage;
use log::{info, warn};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE},
};
use std::time::{Duration, Instant};

/// Webcam or video file opened through `OpenCV`'s videoio
pub struct OpenCvCamera {
    device: DeviceId,
    capture: VideoCapture,
    is_file: bool,
    started: Instant,
    sequence: u64,
}

impl OpenCvCamera {
    /// Open a camera index or a video file / stream URI
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the device does not open
    pub fn open(device: &DeviceId) -> Result<Self> {
        let (mut capture, is_file) = match device {
            DeviceId::Index(index) => {
                info!("Opening camera {}", index);
                let index = i32::try_from(*index)
                    .map_err(|_| Error::InvalidInput(format!("Camera index {index} out of range")))?;
                (VideoCapture::new(index, videoio::CAP_ANY)?, false)
            }
            DeviceId::Uri(uri) => {
                info!("Opening video source: {}", uri);
                (VideoCapture::from_file(uri, videoio::CAP_ANY)?, true)
            }
        };

        if !capture.is_opened()? {
            return Err(Error::DeviceUnavailable(format!("{device}: failed to open")));
        }

        if !is_file {
            // Keep at most one frame queued so reads return the freshest image
            if !capture.set(CAP_PROP_BUFFERSIZE, 1.0)? {
                warn!("{}: capture backend ignored buffer size request", device);
            }
        }

        Ok(Self {
            device: device.clone(),
            capture,
            is_file,
            started: Instant::now(),
            sequence: 0,
        })
    }

    fn to_gray(mat: &Mat) -> Result<GrayImage> {
        let mut gray = Mat::default();
        if mat.channels() == 1 {
            mat.copy_to(&mut gray)?;
        } else {
            imgproc::cvt_color(mat, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        }
        let width = u32::try_from(gray.cols()).map_err(|_| Error::InvalidInput("Negative frame width".into()))?;
        let height = u32::try_from(gray.rows()).map_err(|_| Error::InvalidInput("Negative frame height".into()))?;
        GrayImage::from_raw(width, height, gray.data_bytes()?.to_vec())
            .ok_or_else(|| Error::InvalidInput("Frame buffer size mismatch".to_string()))
    }
}

impl FrameSource for OpenCvCamera {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let requested = Instant::now();
        let mut mat = Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {e}", self.device)))?;

        if !grabbed || mat.empty() {
            if self.is_file {
                info!("End of video reached");
                return Ok(None);
            }
            return Err(Error::DeviceUnavailable(format!("{}: no frame from camera", self.device)));
        }

        // videoio reads cannot be interrupted; a slow read is only reported
        if requested.elapsed() > timeout {
            warn!("{}: frame read exceeded {:?}", self.device, timeout);
        }

        let frame = Frame::new(Self::to_gray(&mat)?, self.started.elapsed(), self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("{}: failed to release capture: {}", self.device, e);
        } else {
            info!("Released {}", self.device);
        }
    }
}
