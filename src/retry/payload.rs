//! Oversized-request retry policy.

use super::{RetryAction, RetryContext, RetryDecision, RetryPolicy};
use crate::types::AttemptOutcome;
use tracing::debug;

/// Retries an entity-too-large rejection once, asking the orchestrator to
/// shrink the request's batch/page size first. A second rejection at the
/// reduced size is surfaced to the caller.
#[derive(Debug, Clone)]
pub struct PayloadSizePolicy<I> {
    inner: I,
}

impl<I> PayloadSizePolicy<I> {
    /// Create a payload-size policy wrapping `inner`.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: RetryPolicy> RetryPolicy for PayloadSizePolicy<I> {
    fn should_retry(&self, outcome: &AttemptOutcome, ctx: &mut RetryContext) -> RetryDecision {
        if !matches!(outcome, AttemptOutcome::EntityTooLarge) {
            return self.inner.should_retry(outcome, ctx);
        }

        if ctx.shrink_applied {
            return RetryDecision::DoNotRetry;
        }

        ctx.shrink_applied = true;
        debug!(
            operation_id = %ctx.operation_id,
            "request too large, retrying with reduced granularity"
        );
        RetryDecision::retry_now(RetryAction {
            refresh_routing: false,
            re_extract_key: false,
            shrink_page: true,
        })
    }
}
