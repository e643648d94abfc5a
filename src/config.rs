//! Configuration for the dispatch chain.

use std::time::Duration;

/// HTTP statuses that take the retry path instead of being accepted.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Configuration for the dispatch middleware and its proxy pool.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Region identity attached to every request (lowercased).
    pub region: String,
    /// Ordered list of proxy addresses (scheme+host+port).
    pub proxy_list: Vec<String>,
    /// Consecutive failures before a proxy is quarantined.
    pub quarantine_threshold: usize,
    /// Maximum retry attempts per request.
    pub max_retries: u32,
    /// Base delay for retry backoff and quarantine windows.
    pub base_delay: Duration,
    /// Multiplier applied per attempt to the retry delay.
    pub backoff_multiplier: f64,
    /// Ceiling on a single quarantine window.
    pub max_quarantine: Duration,
    /// Per-request timeout; firing is treated as a network timeout.
    pub request_timeout: Duration,
    /// How long the pool may stay fully quarantined before the crawl is
    /// considered unable to make progress.
    pub exhaustion_grace: Duration,
}

impl DispatchConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::new()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfigBuilder::new().build()
    }
}

/// Builder for `DispatchConfig`.
pub struct DispatchConfigBuilder {
    region: Option<String>,
    proxy_list: Vec<String>,
    quarantine_threshold: Option<usize>,
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
    backoff_multiplier: Option<f64>,
    max_quarantine: Option<Duration>,
    request_timeout: Option<Duration>,
    exhaustion_grace: Option<Duration>,
}

impl DispatchConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            region: None,
            proxy_list: Vec::new(),
            quarantine_threshold: None,
            max_retries: None,
            base_delay: None,
            backoff_multiplier: None,
            max_quarantine: None,
            request_timeout: None,
            exhaustion_grace: None,
        }
    }

    /// Set the region identity attached to every request.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the ordered list of proxy addresses.
    pub fn proxy_list(mut self, proxies: Vec<impl Into<String>>) -> Self {
        self.proxy_list = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of consecutive failures before quarantine.
    pub fn quarantine_threshold(mut self, threshold: usize) -> Self {
        self.quarantine_threshold = Some(threshold);
        self
    }

    /// Set the maximum retry attempts per request.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the base delay for retry backoff and quarantine windows.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Set the per-attempt backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Set the ceiling on a single quarantine window.
    pub fn max_quarantine(mut self, ceiling: Duration) -> Self {
        self.max_quarantine = Some(ceiling);
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the grace window for total proxy exhaustion.
    pub fn exhaustion_grace(mut self, grace: Duration) -> Self {
        self.exhaustion_grace = Some(grace);
        self
    }

    /// Build the configuration. The region is lowercased here so annotation
    /// and header capitalization work from one canonical form.
    pub fn build(self) -> DispatchConfig {
        DispatchConfig {
            region: self
                .region
                .unwrap_or_else(|| "krasnodar".to_string())
                .to_lowercase(),
            proxy_list: self.proxy_list,
            quarantine_threshold: self.quarantine_threshold.unwrap_or(3),
            max_retries: self.max_retries.unwrap_or(3),
            base_delay: self.base_delay.unwrap_or(Duration::from_secs(1)),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(2.0),
            max_quarantine: self.max_quarantine.unwrap_or(Duration::from_secs(300)),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            exhaustion_grace: self.exhaustion_grace.unwrap_or(Duration::from_secs(60)),
        }
    }
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
