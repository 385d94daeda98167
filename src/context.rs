//! Per-operation cancellation and deadline context.
//!
//! Every logical operation carries one [`OperationContext`]; it is checked at
//! the defined suspension points (before each send, before each backoff wait,
//! and while awaiting a coalesced cache population). Cancellation is explicit
//! rather than ambient: the context is passed by reference through the
//! orchestrator and the caches.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation and deadline state for one logical operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Operation identifier for log correlation.
    id: Uuid,

    /// Caller-controlled cancellation signal.
    token: CancellationToken,

    /// Absolute deadline, if any.
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Create a context with no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Create a context tied to an externally owned cancellation token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Operation identifier for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation of this operation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check for cancellation or an elapsed deadline without suspending.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Resolve once the operation is interrupted, returning the reason.
    ///
    /// Pends forever when there is no deadline and no cancellation arrives.
    pub async fn interrupted(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => Error::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Suspend for `delay`, unwinding early on cancellation or deadline.
    pub async fn wait(&self, delay: Duration) -> Result<()> {
        self.check()?;
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            err = self.interrupted() => Err(err),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_when_idle() {
        let ctx = OperationContext::new();
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_check_after_cancel() {
        let ctx = OperationContext::new();
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(10));
        assert!(ctx.check().is_ok());
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_completes_within_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(10));
        assert!(ctx.wait(Duration::from_millis(100)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cut_short_by_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(50));
        let result = ctx.wait(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_wait_cut_short_by_cancel() {
        let ctx = OperationContext::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.wait(Duration::from_secs(60)).await });
        ctx.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_external_token_is_shared() {
        let token = CancellationToken::new();
        let ctx = OperationContext::with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
