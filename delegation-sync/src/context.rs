//! Cancellation and deadline propagation
//!
//! A `SyncContext` is handed to every operation that may suspend. Cancelling a
//! context cancels all of its children; a child's deadline never outlives its
//! parent's.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// Explicitly cancelled (by this context or an ancestor)
    Cancelled,
    /// Deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline
#[derive(Debug, Clone)]
pub struct SyncContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl SyncContext {
    /// Context that only ends when cancelled
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a child with its own timeout, capped by this context's deadline
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => parent.min(own),
            None => own,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check; `Some` once the context is done
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is cancelled or its deadline passes
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Race `fut` against this context
    pub async fn run<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        if let Some(reason) = self.err() {
            return Err(Error::Cancelled(reason));
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(Error::Cancelled(reason)),
            output = fut => Ok(output),
        }
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_is_not_done() {
        let ctx = SyncContext::background();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_child() {
        let parent = SyncContext::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));

        parent.cancel();

        assert_eq!(child.err(), Some(CancelReason::Cancelled));
        assert_eq!(child.done().await, CancelReason::Cancelled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent() {
        let parent = SyncContext::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));

        child.cancel();

        assert_eq!(child.err(), Some(CancelReason::Cancelled));
        assert_eq!(parent.err(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_capped_by_parent() {
        let parent = SyncContext::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(10));

        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.done().await, CancelReason::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = SyncContext::with_timeout(Duration::from_millis(50));

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;

        assert!(matches!(
            result,
            Err(Error::Cancelled(CancelReason::DeadlineExceeded))
        ));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = SyncContext::with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }
}
