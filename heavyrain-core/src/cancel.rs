use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Cooperative stop flag shared between the signal handler and the executors.
///
/// Cancelling is one-way and idempotent. Executors poll [`is_cancelled`](Self::is_cancelled)
/// between iterations and may await [`cancelled`](Self::cancelled) to cut a wait short.
/// Nothing here interrupts a request already in flight.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
            self.inner.notify.notify_waiters();
        }
    }

    /// Resolves once the token has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking so a concurrent cancel() cannot slip in between.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleeps for `wait`, returning early once the token is cancelled.
    pub async fn sleep(&self, wait: Duration) {
        if wait.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.cancelled() => {}
        }
    }
}
