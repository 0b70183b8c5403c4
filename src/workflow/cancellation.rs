use crate::error::{Result, TraceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag passed into every suspending call of a retry.
///
/// Cancelling stops this process from waiting or writing; a transaction that
/// was already broadcast may still confirm on the network afterwards.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once `cancel` has been called on any clone
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(TraceError::Cancelled);
        }
        Ok(())
    }
}
