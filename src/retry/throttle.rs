//! Throttling (request-rate-too-large) retry policy.

use super::{RetryAction, RetryContext, RetryDecision, RetryPolicy};
use crate::config::RetryConfig;
use crate::types::AttemptOutcome;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Fraction of the computed backoff added as random jitter. Jitter is only
/// ever added, so a server-supplied retry-after hint is always honored in
/// full.
const JITTER_FRACTION: f64 = 0.25;

/// Retries throttled attempts until the configured attempt budget runs out,
/// waiting the server-supplied retry-after when present and falling back to
/// capped exponential backoff otherwise.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy<I> {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    inner: I,
}

impl<I> ThrottlePolicy<I> {
    /// Create a throttle policy wrapping `inner`.
    pub fn new(config: &RetryConfig, inner: I) -> Self {
        Self {
            max_attempts: config.max_throttle_attempts,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            inner,
        }
    }

    fn backoff(&self, retried: u32) -> Duration {
        let exp = retried.min(16);
        let raw = self
            .backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_cap);
        let jitter = raw.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION));
        raw + jitter
    }
}

impl<I: RetryPolicy> RetryPolicy for ThrottlePolicy<I> {
    fn should_retry(&self, outcome: &AttemptOutcome, ctx: &mut RetryContext) -> RetryDecision {
        let retry_after = match outcome {
            AttemptOutcome::Throttled { retry_after } => *retry_after,
            other => return self.inner.should_retry(other, ctx),
        };

        if ctx.throttle_attempts >= self.max_attempts {
            warn!(
                operation_id = %ctx.operation_id,
                attempts = ctx.throttle_attempts,
                "throttle retry budget exhausted"
            );
            return RetryDecision::DoNotRetry;
        }

        let delay = retry_after.unwrap_or_else(|| self.backoff(ctx.throttle_attempts));
        ctx.throttle_attempts += 1;
        debug!(
            operation_id = %ctx.operation_id,
            attempt = ctx.throttle_attempts,
            delay_ms = delay.as_millis() as u64,
            "throttled, backing off"
        );
        RetryDecision::Retry {
            delay,
            action: RetryAction::none(),
        }
    }
}
