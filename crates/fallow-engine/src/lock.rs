//! Single-flight wipe flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide "wipe in progress" flag.
///
/// At most one wipe (manual, scheduled, or catch-up) runs at a time.
/// Acquisition hands out a guard that releases on drop, so every exit path
/// releases exactly once.
#[derive(Debug, Default)]
pub struct WipeLock {
    in_progress: AtomicBool,
}

impl WipeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag. `None` when a wipe is already running; the loser is
    /// rejected, not queued.
    pub fn try_acquire(&self) -> Option<WipeGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| WipeGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop.
#[derive(Debug)]
pub struct WipeGuard<'a> {
    lock: &'a WipeLock,
}

impl Drop for WipeGuard<'_> {
    fn drop(&mut self) {
        self.lock.in_progress.store(false, Ordering::Release);
    }
}
