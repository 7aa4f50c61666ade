use crate::source::DeviceId;
use crate::{Error, Result};
use log::debug;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tracks which capture devices are owned by a session.
///
/// Sessions that may compete for a device must share one registry; there
/// is no process-wide instance.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    claimed: Mutex<HashSet<DeviceId>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<DeviceId>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take exclusive ownership of a device until the claim is dropped
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceBusy`] if the device is already claimed
    pub fn claim(self: &Arc<Self>, device: &DeviceId) -> Result<DeviceClaim> {
        if !self.lock().insert(device.clone()) {
            return Err(Error::DeviceBusy(device.to_string()));
        }
        debug!("Claimed {device}");
        Ok(DeviceClaim {
            registry: Arc::clone(self),
            device: device.clone(),
        })
    }

    #[must_use]
    pub fn is_claimed(&self, device: &DeviceId) -> bool {
        self.lock().contains(device)
    }
}

/// Exclusive ownership of one device; released on drop
#[derive(Debug)]
pub struct DeviceClaim {
    registry: Arc<DeviceRegistry>,
    device: DeviceId,
}

impl DeviceClaim {
    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.device);
        debug!("Released {}", self.device);
    }
}
