//! Cooperative cancellation for running projections.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag.
///
/// Clones share the flag, so a token handed to another thread (or a signal
/// handler) can stop a projection running elsewhere. The flag is only checked
/// between events: the event being processed always completes.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the projection to stop after the current event.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the token (done at the start of every run).
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
