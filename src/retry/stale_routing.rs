//! Stale-routing (partition gone/split/migration) retry policy.

use super::{RetryAction, RetryContext, RetryDecision, RetryPolicy};
use crate::types::AttemptOutcome;
use tracing::{debug, warn};

/// Retries attempts that failed because the cached routing metadata went
/// stale, forcing a route cache refresh before each resend.
///
/// All stale sub-classes (split in progress, split completing, migration
/// completing, range gone) are handled identically; the sub-class is logged
/// for observability only. The attempt ceiling keeps a permanently broken
/// container from looping forever, since topology convergence cannot be
/// assumed.
#[derive(Debug, Clone)]
pub struct StaleRoutingPolicy<I> {
    max_attempts: u32,
    inner: I,
}

impl<I> StaleRoutingPolicy<I> {
    /// Create a stale-routing policy wrapping `inner`.
    pub fn new(max_attempts: u32, inner: I) -> Self {
        Self {
            max_attempts,
            inner,
        }
    }
}

impl<I: RetryPolicy> RetryPolicy for StaleRoutingPolicy<I> {
    fn should_retry(&self, outcome: &AttemptOutcome, ctx: &mut RetryContext) -> RetryDecision {
        let kind = match outcome {
            AttemptOutcome::StaleRouting(kind) => *kind,
            other => return self.inner.should_retry(other, ctx),
        };

        if ctx.stale_routing_attempts >= self.max_attempts {
            warn!(
                operation_id = %ctx.operation_id,
                attempts = ctx.stale_routing_attempts,
                kind = %kind,
                "stale-routing retry budget exhausted"
            );
            return RetryDecision::DoNotRetry;
        }

        ctx.stale_routing_attempts += 1;
        debug!(
            operation_id = %ctx.operation_id,
            attempt = ctx.stale_routing_attempts,
            kind = %kind,
            "stale routing metadata, refreshing route cache"
        );
        RetryDecision::retry_now(RetryAction::refresh_routing())
    }
}
