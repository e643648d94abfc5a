//! Retry policy: maps failure signals to retry decisions.

use crate::config::DispatchConfig;
use crate::context::RequestContext;
use crate::error::FailureKind;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Bounded jitter applied to retry delays, as a fraction of the delay.
const JITTER_FRACTION: f64 = 0.2;

/// Decision for one failure event. Produced fresh per event, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-dispatch after `delay`.
    Retry { delay: Duration },
    /// Retries exhausted; the request fails with the last observed failure.
    Abandon { reason: FailureKind },
    /// Not a transient condition; surface immediately without retrying.
    Escalate { reason: FailureKind },
}

/// Maps failure signals to retry decisions with exponential backoff.
///
/// Delays carry bounded random jitter so many in-flight requests failing at
/// once do not retry in lockstep.
pub struct RetryCoordinator {
    max_retries: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
    rng: Mutex<SmallRng>,
}

impl RetryCoordinator {
    pub fn new(config: &DispatchConfig) -> Self {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    /// Coordinator with a fixed jitter seed, for deterministic tests.
    pub fn with_seed(config: &DispatchConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: &DispatchConfig, rng: SmallRng) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            backoff_multiplier: config.backoff_multiplier,
            rng: Mutex::new(rng),
        }
    }

    /// Decide the disposition of a failure on the given request.
    ///
    /// Non-retryable kinds escalate immediately. Otherwise the request is
    /// abandoned exactly when `attempt >= max_retries`, and retried with
    /// backoff before that.
    pub fn decide(&self, ctx: &RequestContext, kind: &FailureKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::Escalate { reason: kind.clone() };
        }

        if ctx.attempt >= self.max_retries {
            return RetryDecision::Abandon { reason: kind.clone() };
        }

        RetryDecision::Retry {
            delay: self.jittered(self.backoff_delay(ctx.attempt)),
        }
    }

    /// Nominal delay before attempt `attempt + 1`, without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self
            .rng
            .lock()
            .random_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
        delay.mul_f64(factor)
    }
}
