use super::{DeviceId, Frame, FrameSource};
use crate::slot::{LatestSlot, SlotWait};
use crate::{Error, Result};
use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Shared {
    slot: LatestSlot<Frame>,
    finished: AtomicBool,
}

/// Create a connected pusher/source pair for `device`.
///
/// The pusher side is handed to whatever drives the platform capture API;
/// the source side is handed to a tracking session.
#[must_use]
pub fn channel(device: DeviceId) -> (FramePusher, PushFrameSource) {
    let shared = Arc::new(Shared {
        slot: LatestSlot::new(),
        finished: AtomicBool::new(false),
    });
    let pusher = FramePusher {
        shared: Arc::clone(&shared),
        next_sequence: 0,
        started: Instant::now(),
        last_timestamp: None,
    };
    let source = PushFrameSource {
        device,
        shared,
        seen: 0,
    };
    (pusher, source)
}

/// Producer half: stamps and publishes frames.
///
/// Dropping the pusher without calling [`FramePusher::finish`] is seen by
/// the source as a device disconnect.
pub struct FramePusher {
    shared: Arc<Shared>,
    next_sequence: u64,
    started: Instant,
    last_timestamp: Option<Duration>,
}

impl FramePusher {
    /// Publish a frame captured now; returns its sequence index
    pub fn push(&mut self, image: GrayImage) -> u64 {
        let timestamp = self.started.elapsed();
        self.push_at(image, timestamp)
    }

    /// Publish a frame with an explicit capture timestamp.
    ///
    /// Timestamps that do not increase are nudged forward by one
    /// microsecond so the published stream stays strictly ordered.
    pub fn push_at(&mut self, image: GrayImage, timestamp: Duration) -> u64 {
        let timestamp = match self.last_timestamp {
            Some(last) if timestamp <= last => last + Duration::from_micros(1),
            _ => timestamp,
        };
        self.last_timestamp = Some(timestamp);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.shared.slot.publish(Frame::new(image, timestamp, sequence));
        sequence
    }

    /// End the stream cleanly; the source reports end-of-stream once the
    /// last published frame has been read.
    pub fn finish(self) {
        self.shared.finished.store(true, Ordering::SeqCst);
        // Drop closes the slot
    }
}

impl Drop for FramePusher {
    fn drop(&mut self) {
        self.shared.slot.close();
    }
}

/// Consumer half: always yields the freshest unread frame
pub struct PushFrameSource {
    device: DeviceId,
    shared: Arc<Shared>,
    seen: u64,
}

impl FrameSource for PushFrameSource {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        match self.shared.slot.wait_newer(self.seen, timeout) {
            SlotWait::Value(version, frame) => {
                self.seen = version;
                Ok(Some(frame))
            }
            SlotWait::Timeout => Err(Error::FrameTimeout),
            SlotWait::Closed if self.shared.finished.load(Ordering::SeqCst) => Ok(None),
            SlotWait::Closed => Err(Error::DeviceUnavailable(format!(
                "{}: capture stopped",
                self.device
            ))),
        }
    }
}
