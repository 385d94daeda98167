//! Composable retry policies.
//!
//! Each policy inspects a classified [`AttemptOutcome`] and either owns the
//! decision or delegates to its inner policy. Decisions are plain data: a
//! [`RetryDecision::Retry`] carries the delay to wait and a [`RetryAction`]
//! describing the side effects the orchestrator applies before resending
//! (route cache refresh, key re-extraction, page shrink). Policies never
//! perform the side effects themselves, which keeps the decision tables
//! directly testable.

pub mod mismatch;
pub mod payload;
pub mod stale_routing;
pub mod throttle;

pub use mismatch::MismatchPolicy;
pub use payload::PayloadSizePolicy;
pub use stale_routing::StaleRoutingPolicy;
pub use throttle::ThrottlePolicy;

use crate::config::RetryConfig;
use crate::types::AttemptOutcome;
use std::time::Duration;
use uuid::Uuid;

/// Per-logical-operation retry state, threaded through the attempt loop.
///
/// Owned exclusively by one in-flight operation and destroyed with it.
/// Attempt counts only grow within an operation; a new logical operation
/// starts from a fresh context.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Identifier of the owning operation, for log correlation.
    pub operation_id: Uuid,

    /// Total send attempts made so far.
    pub attempts: u32,

    /// Total time spent waiting between attempts.
    pub cumulative_delay: Duration,

    /// The last non-success outcome observed.
    pub last_failure: Option<AttemptOutcome>,

    /// Attempts retried due to throttling.
    pub throttle_attempts: u32,

    /// Attempts retried due to stale routing metadata.
    pub stale_routing_attempts: u32,

    /// Whether the routing cache was already force-refreshed for a partition
    /// key mismatch this operation. Guards against refresh storms: a second
    /// mismatch after a refresh is a client bug, not staleness.
    pub mismatch_retried: bool,

    /// Whether the request granularity was already shrunk once.
    pub shrink_applied: bool,
}

impl RetryContext {
    /// Create a fresh context for one logical operation.
    pub fn new(operation_id: Uuid) -> Self {
        Self {
            operation_id,
            attempts: 0,
            cumulative_delay: Duration::ZERO,
            last_failure: None,
            throttle_attempts: 0,
            stale_routing_attempts: 0,
            mismatch_retried: false,
            shrink_applied: false,
        }
    }

    /// Record one completed send attempt and its outcome.
    pub fn record_attempt(&mut self, outcome: &AttemptOutcome) {
        self.attempts += 1;
        if !outcome.is_success() {
            self.last_failure = Some(outcome.clone());
        }
    }

    /// Record a backoff delay that was actually waited.
    pub fn record_delay(&mut self, delay: Duration) {
        self.cumulative_delay += delay;
    }
}

/// Side effects to apply before the next send attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryAction {
    /// Force-refresh the routing cache for the container, then re-resolve
    /// the route.
    pub refresh_routing: bool,

    /// Re-extract the partition key from the document (after a schema
    /// refresh).
    pub re_extract_key: bool,

    /// Reduce the request's batch/page size before resending.
    pub shrink_page: bool,
}

impl RetryAction {
    /// No side effects.
    pub fn none() -> Self {
        Self::default()
    }

    /// Refresh routing metadata only.
    pub fn refresh_routing() -> Self {
        Self {
            refresh_routing: true,
            ..Self::default()
        }
    }
}

/// A policy's verdict on one completed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`, applying `action` first.
    Retry {
        delay: Duration,
        action: RetryAction,
    },
    /// Surface the outcome to the caller.
    DoNotRetry,
}

impl RetryDecision {
    /// Retry immediately with the given action.
    pub fn retry_now(action: RetryAction) -> Self {
        RetryDecision::Retry {
            delay: Duration::ZERO,
            action,
        }
    }
}

/// One layer of the retry chain.
///
/// Policies are ordered outer to inner; a policy handles the outcome classes
/// it owns and delegates everything else inward.
pub trait RetryPolicy: Send + Sync {
    /// Decide whether the operation should be retried after `outcome`.
    fn should_retry(&self, outcome: &AttemptOutcome, ctx: &mut RetryContext) -> RetryDecision;
}

/// Innermost policy: nothing left to own the outcome, do not retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl RetryPolicy for FallbackPolicy {
    fn should_retry(&self, _outcome: &AttemptOutcome, _ctx: &mut RetryContext) -> RetryDecision {
        RetryDecision::DoNotRetry
    }
}

/// The default policy chain, outermost first: stale routing, partition key
/// mismatch, payload size, throttling, fallback.
pub fn default_chain(
    config: &RetryConfig,
) -> StaleRoutingPolicy<MismatchPolicy<PayloadSizePolicy<ThrottlePolicy<FallbackPolicy>>>> {
    StaleRoutingPolicy::new(
        config.max_stale_routing_attempts,
        MismatchPolicy::new(PayloadSizePolicy::new(ThrottlePolicy::new(
            config,
            FallbackPolicy,
        ))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StaleKind;
    use bytes::Bytes;

    fn ctx() -> RetryContext {
        RetryContext::new(Uuid::new_v4())
    }

    #[test]
    fn test_fallback_never_retries() {
        let policy = FallbackPolicy;
        let outcome = AttemptOutcome::OtherFailure {
            status: 500,
            sub_status: 0,
            message: "server error".into(),
        };
        assert_eq!(
            policy.should_retry(&outcome, &mut ctx()),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn test_context_tracks_attempts_and_failures() {
        let mut ctx = ctx();
        ctx.record_attempt(&AttemptOutcome::Throttled { retry_after: None });
        ctx.record_attempt(&AttemptOutcome::Success(Bytes::new()));
        assert_eq!(ctx.attempts, 2);
        // Success does not overwrite the last failure.
        assert!(matches!(
            ctx.last_failure,
            Some(AttemptOutcome::Throttled { .. })
        ));
    }

    #[test]
    fn test_default_chain_handles_every_retryable_class() {
        let chain = default_chain(&RetryConfig::default());

        let retryable = [
            AttemptOutcome::Throttled { retry_after: None },
            AttemptOutcome::EntityTooLarge,
            AttemptOutcome::StaleRouting(StaleKind::SplitInProgress),
            AttemptOutcome::StaleRouting(StaleKind::RangeGone),
            AttemptOutcome::PartitionKeyMismatch,
        ];
        for outcome in retryable {
            let mut ctx = ctx();
            assert!(
                matches!(
                    chain.should_retry(&outcome, &mut ctx),
                    RetryDecision::Retry { .. }
                ),
                "expected retry for {}",
                outcome
            );
        }

        let fatal = AttemptOutcome::OtherFailure {
            status: 404,
            sub_status: 0,
            message: "not found".into(),
        };
        assert_eq!(
            chain.should_retry(&fatal, &mut ctx()),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn test_chain_delegation_reaches_inner_throttle_policy() {
        // The throttle policy sits inside the stale-routing policy; a
        // throttled outcome must pass through the outer layers untouched.
        let chain = default_chain(&RetryConfig::default());
        let mut ctx = ctx();
        let decision = chain.should_retry(
            &AttemptOutcome::Throttled {
                retry_after: Some(Duration::from_millis(200)),
            },
            &mut ctx,
        );
        match decision {
            RetryDecision::Retry { delay, action } => {
                assert!(delay >= Duration::from_millis(200));
                assert_eq!(action, RetryAction::none());
            }
            RetryDecision::DoNotRetry => panic!("throttled outcome must be retried"),
        }
        assert_eq!(ctx.throttle_attempts, 1);
        assert_eq!(ctx.stale_routing_attempts, 0);
    }
}
