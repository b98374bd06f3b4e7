//! Deadline-scoped execution context for a single transfer
//!
//! Every upload or download runs inside one `TransferContext`: a fixed deadline
//! measured from creation plus a cancellation token. The context is passed
//! explicitly to every collaborator call. Dropping it cancels the token, so
//! anything a collaborator spawned against it winds down on every exit path.
//!
//! Time comes from `tokio::time`, which lets tests drive deadlines with a
//! paused clock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a context-bound future did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    DeadlineExceeded,
    Cancelled,
}

/// Deadline plus cancellation bound to one transfer call
#[derive(Debug)]
pub struct TransferContext {
    deadline: Instant,
    timeout: Duration,
    token: CancelToken,
    parent: Option<CancelToken>,
}

impl TransferContext {
    /// Context expiring `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            token: CancelToken::new(),
            parent: None,
        }
    }

    /// Context that is also cancelled when `parent` is
    pub fn with_parent(timeout: Duration, parent: &CancelToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            token: CancelToken::new(),
            parent: Some(parent.clone()),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self.parent.as_ref().map_or(false, |p| p.is_cancelled())
    }

    /// Resolves when this context or its parent is cancelled
    pub async fn cancelled(&self) {
        match &self.parent {
            Some(parent) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = parent.cancelled() => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first.
    ///
    /// An interrupted future is dropped, which aborts any in-flight I/O it owns.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
