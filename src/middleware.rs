//! Request dispatch middleware: the single entry point for lifecycle events.

use crate::config::{DispatchConfig, RETRYABLE_STATUSES};
use crate::context::{DispatchState, RequestContext};
use crate::error::{DispatchError, FailureKind};
use crate::pool::{ProxyOutcome, ProxyPool};
use crate::region::RegionAnnotator;
use crate::retry::{RetryCoordinator, RetryDecision};

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Instruction returned to the fetch engine for a lifecycle event. The
/// engine owns scheduling; the middleware never performs retries itself.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Keep the response; the request is done.
    Accept,
    /// Re-enqueue the request after `delay`.
    Retry { delay: Duration },
    /// Drop the request; it has permanently failed with `error`.
    Drop { error: DispatchError },
}

/// Orchestrates region annotation, proxy selection, health bookkeeping, and
/// retry decisions across a request's lifecycle.
///
/// Lifecycle callbacks are synchronous, bounded-time transformations; the
/// fetch engine owns all network I/O and delivers `before_send`,
/// `on_response`, and `on_error` per request, never overlapping for a given
/// request.
pub struct RequestDispatchMiddleware {
    pool: Arc<ProxyPool>,
    annotator: RegionAnnotator,
    retry: RetryCoordinator,
    exhaustion_grace: Duration,
}

impl RequestDispatchMiddleware {
    pub fn new(config: DispatchConfig) -> Self {
        let annotator = RegionAnnotator::new(&config.region);
        let retry = RetryCoordinator::new(&config);
        let pool = Arc::new(ProxyPool::new(config.clone()));
        info!("Dispatch middleware initialized for region {}", annotator.region());

        Self {
            pool,
            annotator,
            retry,
            exhaustion_grace: config.exhaustion_grace,
        }
    }

    /// Middleware with a fixed retry-jitter seed, for deterministic tests.
    pub fn with_seed(config: DispatchConfig, seed: u64) -> Self {
        let retry = RetryCoordinator::with_seed(&config, seed);
        let mut middleware = Self::new(config);
        middleware.retry = retry;
        middleware
    }

    /// The region attached to every outbound request.
    pub fn current_region(&self) -> &str {
        self.annotator.region()
    }

    /// Per-proxy health view for operators.
    pub fn pool_snapshot(&self) -> Vec<crate::proxy::ProxyHealth> {
        self.pool.snapshot()
    }

    /// Shared handle to the proxy pool.
    pub fn pool(&self) -> Arc<ProxyPool> {
        Arc::clone(&self.pool)
    }

    /// Prepare a request for dispatch: region identity first, then proxy
    /// selection, on every attempt. A retry that switches proxies still
    /// carries the region cookies and headers.
    pub fn before_send(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        self.before_send_at(ctx, Instant::now())
    }

    /// `before_send` with an explicit clock.
    pub fn before_send_at(
        &self,
        ctx: &mut RequestContext,
        now: Instant,
    ) -> Result<(), DispatchError> {
        match ctx.state {
            DispatchState::Pending => {}
            DispatchState::FailedRetrying => {
                ctx.attempt += 1;
                ctx.assigned_proxy = None;
            }
            state => {
                return Err(DispatchError::InvalidRequest {
                    reason: format!("dispatch from state {state:?}"),
                });
            }
        }

        if let Some(exhausted_for) = self.pool.exhausted_for(now) {
            if exhausted_for > self.exhaustion_grace {
                warn!(
                    "Proxy pool exhausted for {:?}, past grace window of {:?}",
                    exhausted_for, self.exhaustion_grace
                );
                ctx.state = DispatchState::FailedTerminal;
                return Err(DispatchError::ProxyExhausted { exhausted_for });
            }
        }

        self.annotator.annotate(ctx);

        if let Some(proxy) = self.pool.select_at(now) {
            debug!(
                "Using proxy {} for {} (attempt {})",
                proxy.address,
                ctx.url,
                ctx.attempt + 1
            );
            ctx.assigned_proxy = Some(proxy.address);
        }

        ctx.state = DispatchState::Dispatched;
        Ok(())
    }

    /// Handle a response from the fetch engine. Retryable statuses (408,
    /// 429, 500, 502, 503, 504) take the failure path and penalize the proxy
    /// used; everything else is accepted.
    pub fn on_response(&self, ctx: &mut RequestContext, status: u16) -> Disposition {
        self.on_response_at(ctx, status, Instant::now())
    }

    /// `on_response` with an explicit clock.
    pub fn on_response_at(
        &self,
        ctx: &mut RequestContext,
        status: u16,
        now: Instant,
    ) -> Disposition {
        if RETRYABLE_STATUSES.contains(&status) {
            return self.handle_failure(ctx, FailureKind::UpstreamRejection(status), now);
        }

        if let Some(address) = &ctx.assigned_proxy {
            self.pool.record_outcome_at(address, ProxyOutcome::Success, now);
        }
        ctx.state = DispatchState::Succeeded;
        debug!("Request {} succeeded with status {status}", ctx.url);
        Disposition::Accept
    }

    /// Handle a transport failure or a fired per-request timeout.
    pub fn on_error(&self, ctx: &mut RequestContext, kind: FailureKind) -> Disposition {
        self.on_error_at(ctx, kind, Instant::now())
    }

    /// `on_error` with an explicit clock.
    pub fn on_error_at(
        &self,
        ctx: &mut RequestContext,
        kind: FailureKind,
        now: Instant,
    ) -> Disposition {
        self.handle_failure(ctx, kind, now)
    }

    /// Caller cancelled the request (e.g. crawl shutdown). Terminal, with no
    /// proxy penalty: cancellation is not proxy fault.
    pub fn cancel(&self, ctx: &mut RequestContext) -> Disposition {
        ctx.state = DispatchState::FailedTerminal;
        debug!("Request {} cancelled", ctx.url);
        Disposition::Drop {
            error: DispatchError::Cancelled,
        }
    }

    /// Shared failure path. Proxy health is updated before the retry
    /// decision: whether the just-used proxy ends up quarantined changes
    /// which proxy the next attempt can draw.
    fn handle_failure(
        &self,
        ctx: &mut RequestContext,
        kind: FailureKind,
        now: Instant,
    ) -> Disposition {
        if kind.is_retryable() {
            if let Some(address) = &ctx.assigned_proxy {
                self.pool.record_outcome_at(address, ProxyOutcome::Failure, now);
            }
        }
        ctx.last_failure = Some(kind.clone());

        match self.retry.decide(ctx, &kind) {
            RetryDecision::Retry { delay } => {
                info!(
                    "Request {} failed ({kind}), retrying in {:?} (attempt {})",
                    ctx.url,
                    delay,
                    ctx.attempt + 1
                );
                ctx.state = DispatchState::FailedRetrying;
                Disposition::Retry { delay }
            }
            RetryDecision::Abandon { reason } => {
                warn!("Request {} abandoned after {} attempts: {reason}", ctx.url, ctx.attempt + 1);
                ctx.state = DispatchState::FailedTerminal;
                Disposition::Drop {
                    error: DispatchError::RetriesExhausted {
                        attempts: ctx.attempt + 1,
                        last: reason,
                    },
                }
            }
            RetryDecision::Escalate { reason } => {
                warn!("Request {} escalated: {reason}", ctx.url);
                ctx.state = DispatchState::FailedTerminal;
                let error = match reason {
                    FailureKind::InvalidRequest(reason) => {
                        DispatchError::InvalidRequest { reason }
                    }
                    FailureKind::Network(kind) => DispatchError::Network(kind),
                    FailureKind::UpstreamRejection(status) => {
                        DispatchError::UpstreamRejection { status }
                    }
                };
                Disposition::Drop { error }
            }
        }
    }
}
