//! Run guard preventing overlapping database updates.

use super::types::MigrationError;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-process, non-reentrant "update in progress" flag.
///
/// Share one lock (behind an `Arc`) between every engine that must not
/// update concurrently. A second [`try_begin`](Self::try_begin) fails
/// immediately rather than waiting.
#[derive(Debug, Default)]
pub struct MigrationLock {
    running: AtomicBool,
}

impl MigrationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Result<RunGuard<'_>, MigrationError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MigrationError::AlreadyRunning)?;
        Ok(RunGuard { lock: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one update; releases the lock on drop.
#[derive(Debug)]
pub struct RunGuard<'a> {
    lock: &'a MigrationLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}
