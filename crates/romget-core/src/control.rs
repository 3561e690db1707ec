//! Cooperative cancellation for running transfers.
//!
//! Each admitted task gets a [`TransferHandle`]: the queue manager keeps one
//! clone to request cancellation and wait for the worker to stop, the worker
//! keeps the other to poll the token between reads and report when it is done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Shared flag a transfer polls between chunk reads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One-shot latch set when the worker has released the task.
#[derive(Debug, Default)]
struct DoneLatch {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Cancellable handle for one admitted transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    token: CancelToken,
    latch: Arc<DoneLatch>,
}

impl TransferHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// True if both handles belong to the same admission.
    pub fn same_as(&self, other: &TransferHandle) -> bool {
        Arc::ptr_eq(&self.latch, &other.latch)
    }

    /// Signals the transfer to stop at its next poll.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Marks the worker as finished with this task.
    pub fn mark_done(&self) {
        let mut done = self.latch.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.latch.cv.notify_all();
    }

    /// Blocks until [`mark_done`](Self::mark_done) or `timeout`. Returns whether
    /// the worker finished in time.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let done = self.latch.done.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .latch
            .cv
            .wait_timeout_while(done, timeout, |d| !*d)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}
