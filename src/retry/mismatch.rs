//! Partition-key-mismatch retry policy.

use super::{RetryAction, RetryContext, RetryDecision, RetryPolicy};
use crate::types::AttemptOutcome;
use tracing::{debug, warn};

/// Retries a partition key mismatch at most once per operation.
///
/// The first mismatch may mean the cached routing/collection metadata is
/// stale, so the routing cache is force-refreshed and the partition key
/// re-extracted before the resend. A second mismatch after that refresh
/// means the client itself is wrong (bad schema or corrupt payload) and is
/// surfaced as a fatal error.
#[derive(Debug, Clone)]
pub struct MismatchPolicy<I> {
    inner: I,
}

impl<I> MismatchPolicy<I> {
    /// Create a mismatch policy wrapping `inner`.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: RetryPolicy> RetryPolicy for MismatchPolicy<I> {
    fn should_retry(&self, outcome: &AttemptOutcome, ctx: &mut RetryContext) -> RetryDecision {
        if !matches!(outcome, AttemptOutcome::PartitionKeyMismatch) {
            return self.inner.should_retry(outcome, ctx);
        }

        if ctx.mismatch_retried {
            warn!(
                operation_id = %ctx.operation_id,
                "partition key mismatch persisted after routing refresh"
            );
            return RetryDecision::DoNotRetry;
        }

        ctx.mismatch_retried = true;
        debug!(
            operation_id = %ctx.operation_id,
            "partition key mismatch, refreshing routing metadata once"
        );
        RetryDecision::retry_now(RetryAction {
            refresh_routing: true,
            re_extract_key: true,
            shrink_page: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FallbackPolicy;
    use uuid::Uuid;

    #[test]
    fn test_retries_exactly_once() {
        let policy = MismatchPolicy::new(FallbackPolicy);
        let mut ctx = RetryContext::new(Uuid::new_v4());

        match policy.should_retry(&AttemptOutcome::PartitionKeyMismatch, &mut ctx) {
            RetryDecision::Retry { action, .. } => {
                assert!(action.refresh_routing);
                assert!(action.re_extract_key);
            }
            RetryDecision::DoNotRetry => panic!("first mismatch must retry"),
        }

        assert_eq!(
            policy.should_retry(&AttemptOutcome::PartitionKeyMismatch, &mut ctx),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn test_delegates_other_outcomes() {
        let policy = MismatchPolicy::new(FallbackPolicy);
        let mut ctx = RetryContext::new(Uuid::new_v4());
        assert_eq!(
            policy.should_retry(&AttemptOutcome::EntityTooLarge, &mut ctx),
            RetryDecision::DoNotRetry
        );
        assert!(!ctx.mismatch_retried);
    }
}
