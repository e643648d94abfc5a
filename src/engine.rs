//! reqwest fetch-engine adapter.
//!
//! Binds the dispatch chain to `reqwest_middleware`: each attempt clones the
//! request, applies the context's cookies and headers, routes it through the
//! proxy the chain assigned, and feeds the outcome back as a lifecycle event.
//! Retry dispositions are honored by sleeping and re-dispatching.

use crate::context::RequestContext;
use crate::error::{DispatchError, FailureKind, NetworkErrorKind};
use crate::middleware::{Disposition, RequestDispatchMiddleware};

use anyhow::anyhow;
use async_trait::async_trait;
use http::header::COOKIE;
use log::warn;
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;
use std::time::Duration;

/// `reqwest_middleware::Middleware` that drives the dispatch chain.
#[derive(Clone)]
pub struct CrawlDispatchMiddleware {
    dispatch: Arc<RequestDispatchMiddleware>,
    request_timeout: Duration,
}

impl CrawlDispatchMiddleware {
    pub fn new(dispatch: RequestDispatchMiddleware, request_timeout: Duration) -> Self {
        Self {
            dispatch: Arc::new(dispatch),
            request_timeout,
        }
    }

    /// Shared handle to the dispatch chain, for `pool_snapshot` and
    /// `current_region` access while the client is running.
    pub fn dispatch(&self) -> Arc<RequestDispatchMiddleware> {
        Arc::clone(&self.dispatch)
    }

    /// Copy context cookies and headers onto the outbound request,
    /// preserving anything the caller already set.
    fn apply_context(ctx: &RequestContext, req: &mut reqwest::Request) {
        let headers = req.headers_mut();
        for (name, value) in &ctx.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        if !headers.contains_key(COOKIE) && !ctx.cookies.is_empty() {
            let jar = ctx
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            if let Ok(value) = http::HeaderValue::from_str(&jar) {
                headers.insert(COOKIE, value);
            }
        }
    }

    /// Build a one-shot client routed through the assigned proxy.
    fn proxied_client(&self, ctx: &RequestContext) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.request_timeout);

        if let Some(address) = &ctx.assigned_proxy {
            if let Some(proxy) = self.dispatch.pool().get(address) {
                builder = builder.proxy(proxy.to_reqwest_proxy().map_err(Error::Reqwest)?);
            }
        }

        builder.build().map_err(Error::Reqwest)
    }
}

/// Map a reqwest error to the failure taxonomy the chain understands.
fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Network(NetworkErrorKind::Timeout)
    } else if err.is_connect() {
        FailureKind::Network(NetworkErrorKind::ConnectionRefused)
    } else if err.is_request() || err.is_builder() {
        FailureKind::InvalidRequest(err.to_string())
    } else {
        FailureKind::Network(NetworkErrorKind::Dns)
    }
}

fn terminal(error: DispatchError) -> Error {
    Error::Middleware(anyhow!(error))
}

#[async_trait]
impl Middleware for CrawlDispatchMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let mut ctx = RequestContext::new(req.url().as_str()).map_err(terminal)?;

        loop {
            self.dispatch.before_send(&mut ctx).map_err(terminal)?;

            let mut attempt_req = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;
            Self::apply_context(&ctx, &mut attempt_req);

            let client = self.proxied_client(&ctx)?;

            let disposition = match client.execute(attempt_req).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match self.dispatch.on_response(&mut ctx, status) {
                        Disposition::Accept => return Ok(response),
                        other => other,
                    }
                }
                Err(err) => {
                    warn!(
                        "Request to {} failed via {:?} (attempt {}): {err}",
                        ctx.url,
                        ctx.assigned_proxy,
                        ctx.attempt + 1
                    );
                    self.dispatch.on_error(&mut ctx, classify(&err))
                }
            };

            match disposition {
                Disposition::Accept => unreachable!("accept handled with the response"),
                Disposition::Retry { delay } => tokio::time::sleep(delay).await,
                Disposition::Drop { error } => return Err(terminal(error)),
            }
        }
    }
}
