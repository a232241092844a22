use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-slot wake-up flag with no payload.
///
/// Any number of producers may raise it; raising an already-raised signal is
/// a no-op, so at most one request is ever pending.
#[derive(Debug, Default)]
pub struct PendingSignal {
    pending: AtomicBool,
    notify: Notify,
}

impl PendingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Never blocks.
    pub fn raise(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Wait until the flag is set. Does not clear it.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
