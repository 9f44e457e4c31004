//! Process-wide cooperative cancellation.
//!
//! A single flag is written by whoever owns the run (UI, signal handler) and
//! polled by the walker and by every blocking copy loop. Cancellation is not an
//! error: pollers return early and leave no partial targets behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.swap(true, Ordering::SeqCst) {
            log::warn!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Clear the flag. Only called when a new run starts.
    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }
}
