//! Error types for the crawl-dispatch crate.

use std::time::Duration;
use thiserror::Error;

/// Transport-level failure reported by the fetch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetworkErrorKind {
    /// DNS resolution failed.
    #[error("dns resolution failed")]
    Dns,
    /// The upstream refused the connection.
    #[error("connection refused")]
    ConnectionRefused,
    /// The request timed out (per-request timeout or transport timeout).
    #[error("request timed out")]
    Timeout,
}

/// Failure signal fed into the dispatch chain by the fetch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Retryable transport failure. Penalizes the proxy used.
    Network(NetworkErrorKind),
    /// Retryable upstream rejection (429, 503, ...). Penalizes the proxy used.
    UpstreamRejection(u16),
    /// The request itself is malformed. Never retried.
    InvalidRequest(String),
}

impl FailureKind {
    /// Whether this kind is eligible for retry at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::InvalidRequest(_))
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Network(kind) => write!(f, "network failure: {kind}"),
            FailureKind::UpstreamRejection(status) => {
                write!(f, "upstream rejection: status {status}")
            }
            FailureKind::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
        }
    }
}

/// Errors surfaced by the dispatch middleware to its caller.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Retryable transport failure, surfaced only inside `RetriesExhausted`.
    #[error("network failure: {0}")]
    Network(NetworkErrorKind),

    /// Retryable upstream rejection, surfaced only inside `RetriesExhausted`.
    #[error("upstream rejected request with status {status}")]
    UpstreamRejection { status: u16 },

    /// Every proxy has been quarantined for longer than the grace window.
    /// Forward progress is no longer meaningfully possible.
    #[error("all proxies quarantined for {}s, past the grace window", exhausted_for.as_secs())]
    ProxyExhausted { exhausted_for: Duration },

    /// The request is malformed; retrying would waste proxy capacity.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Retries exhausted; carries the last observed failure for diagnostics.
    #[error("retries exhausted after {attempts} attempts, last failure: {last}")]
    RetriesExhausted { attempts: u32, last: FailureKind },

    /// The caller cancelled the request. Distinct from `RetriesExhausted` so
    /// shutdown is not mistaken for upstream flakiness.
    #[error("request cancelled by caller")]
    Cancelled,
}
