//! Single-slot "latest value" handoff between one producer and any number of readers.
//!
//! Publishing overwrites whatever is in the slot, so a slow reader skips
//! intermediate values and the producer never blocks on readers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of waiting on a [`LatestSlot`]
#[derive(Debug, Clone, PartialEq)]
pub enum SlotWait<T> {
    /// A value newer than the caller's last seen version
    Value(u64, T),
    /// Nothing newer arrived before the deadline
    Timeout,
    /// The producer closed the slot and nothing newer is left
    Closed,
}

struct SlotInner<T> {
    value: Option<T>,
    version: u64,
    closed: bool,
}

/// Overwrite-on-publish slot with version numbers starting at 1
pub struct LatestSlot<T> {
    inner: Mutex<SlotInner<T>>,
    changed: Condvar,
}

impl<T: Clone> LatestSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                value: None,
                version: 0,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the slot content; returns the new version
    pub fn publish(&self, value: T) -> u64 {
        let mut inner = self.lock();
        inner.value = Some(value);
        inner.version += 1;
        let version = inner.version;
        drop(inner);
        self.changed.notify_all();
        version
    }

    /// Current value, if anything was ever published
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Version of the current value (0 before the first publish)
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Non-blocking read of a value newer than `seen`
    #[must_use]
    pub fn newer_than(&self, seen: u64) -> Option<(u64, T)> {
        let inner = self.lock();
        if inner.version > seen {
            inner.value.clone().map(|v| (inner.version, v))
        } else {
            None
        }
    }

    /// Block until a value newer than `seen` is published, the slot is closed,
    /// or `timeout` elapses.
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> SlotWait<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if inner.version > seen {
                if let Some(value) = inner.value.clone() {
                    return SlotWait::Value(inner.version, value);
                }
            }
            if inner.closed {
                return SlotWait::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return SlotWait::Timeout;
            }
            inner = self
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Mark the slot closed and wake all waiters
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T: Clone> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
