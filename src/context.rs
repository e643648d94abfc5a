//! Per-request dispatch state.

use crate::error::{DispatchError, FailureKind};

use http::HeaderMap;
use std::collections::BTreeMap;
use url::Url;

/// Lifecycle state of one request as seen by the dispatch middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Created but not yet dispatched.
    Pending,
    /// Annotated, proxied, and handed to the fetch engine.
    Dispatched,
    /// Final response accepted.
    Succeeded,
    /// Failed, waiting to be re-dispatched after a delay.
    FailedRetrying,
    /// Permanently failed; no further dispatches.
    FailedTerminal,
}

/// Scratch state carried by a request across its dispatch attempts.
///
/// The context owns the request's cookie and header maps; the pool stays the
/// sole owner of proxy state, so `assigned_proxy` is just the address.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: Url,
    /// Zero-based attempt counter; incremented on each re-dispatch.
    pub attempt: u32,
    /// Address of the proxy chosen for the current attempt.
    pub assigned_proxy: Option<String>,
    /// Whether region identity has been applied at least once.
    pub region_applied: bool,
    /// Cookie jar for the request. Ordered, unique keys.
    pub cookies: BTreeMap<String, String>,
    /// Header map for the request. Case-insensitive keys.
    pub headers: HeaderMap,
    pub state: DispatchState,
    /// Last failure observed, kept for `RetriesExhausted` diagnostics.
    pub last_failure: Option<FailureKind>,
}

impl RequestContext {
    /// Create a context for a URL. Rejects anything that is not an absolute
    /// http(s) URL; such requests are caller bugs, not transient failures.
    pub fn new(url: &str) -> Result<Self, DispatchError> {
        let parsed = Url::parse(url).map_err(|e| DispatchError::InvalidRequest {
            reason: format!("unparseable url {url:?}: {e}"),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(DispatchError::InvalidRequest {
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        Ok(Self {
            url: parsed,
            attempt: 0,
            assigned_proxy: None,
            region_applied: false,
            cookies: BTreeMap::new(),
            headers: HeaderMap::new(),
            state: DispatchState::Pending,
            last_failure: None,
        })
    }

    /// Insert a cookie only if the key is not already present. Existing
    /// values (per-spider cookies, prior `Set-Cookie`) always win.
    pub fn cookie_if_absent(&mut self, key: &str, value: &str) {
        self.cookies
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Insert a header only if the name is not already present.
    pub fn header_if_absent(&mut self, name: http::HeaderName, value: http::HeaderValue) {
        if let http::header::Entry::Vacant(entry) = self.headers.entry(name) {
            entry.insert(value);
        }
    }

    /// Whether the request has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            DispatchState::Succeeded | DispatchState::FailedTerminal
        )
    }
}
