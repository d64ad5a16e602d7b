//! `PauseGate`: the reusable pause/resume suspension primitive every phase
//! checks at its natural safe points.
//!
//! Re-architected per spec.md §9's redesign flag, generalizing the
//! teacher's `ApprovalGate` (a one-shot human approval) into a reusable
//! gate: an atomic `paused` flag plus a `tokio::sync::Notify`. `stop()`
//! also notifies, so a waiter always wakes and must re-check which
//! condition fired.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
pub struct PauseGate {
    paused: AtomicBool,
    stopped: AtomicBool,
    notify: Notify,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Unblocks every current and future waiter permanently. Phases must
    /// re-check `is_stopped()` after `await_not_paused` returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Suspends the caller while `paused` is set, waking on `resume()` or
    /// `stop()`. Returns immediately if neither pause nor stop is active.
    pub async fn await_not_paused(&self) {
        loop {
            if self.stopped.load(Ordering::SeqCst) || !self.paused.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering for notification to close the
            // race where pause cleared between the loop condition check
            // and here.
            if self.stopped.load(Ordering::SeqCst) || !self.paused.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
