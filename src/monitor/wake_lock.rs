//! Scoped wake-lock.

use std::sync::Arc;

use crate::host::Platform;

/// Holds a partial wake-lock until dropped.
///
/// Acquisition failures are logged; the guard then holds nothing.
pub struct WakeLockGuard {
    platform: Arc<dyn Platform>,
    tag: &'static str,
    held: bool,
}

impl WakeLockGuard {
    pub fn acquire(platform: Arc<dyn Platform>, tag: &'static str) -> Self {
        let held = match platform.acquire_wake_lock(tag) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tag = tag, error = %e, "Wake lock not acquired");
                false
            }
        };
        Self {
            platform,
            tag,
            held,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Err(e) = self.platform.release_wake_lock(self.tag) {
            tracing::warn!(tag = self.tag, error = %e, "Wake lock release failed");
        }
    }
}
