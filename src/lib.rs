//! # crawl-dispatch
//!
//! Outbound request middleware chain for a regional catalog crawler.
//!
//! The chain attaches region identity (cookies + headers) to every request,
//! rotates requests across a pool of health-tracked proxies, and coordinates
//! retries with exponential backoff. The fetch engine drives it through
//! lifecycle events (`before_send`, `on_response`, `on_error`) and receives
//! a [`Disposition`] telling it whether to accept, retry, or drop; a ready
//! binding for `reqwest_middleware` is provided in [`engine`].

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod region;
pub mod retry;
pub mod utils;

pub use config::{DispatchConfig, DispatchConfigBuilder, RETRYABLE_STATUSES};
pub use context::{DispatchState, RequestContext};
pub use engine::CrawlDispatchMiddleware;
pub use error::{DispatchError, FailureKind, NetworkErrorKind};
pub use middleware::{Disposition, RequestDispatchMiddleware};
pub use pool::{ProxyOutcome, ProxyPool};
pub use proxy::{Proxy, ProxyCredentials, ProxyHealth};
pub use region::RegionAnnotator;
pub use retry::{RetryCoordinator, RetryDecision};
pub use utils::{load_proxy_file, parse_proxy_list};
