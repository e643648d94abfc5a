//! Core proxy pool: health tracking, quarantine, and selection.

use crate::config::DispatchConfig;
use crate::proxy::{Proxy, ProxyHealth};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Outcome of one request attempt through a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    Failure,
}

/// A pool of proxies shared across all in-flight requests.
///
/// Mutation goes through `select` and `record_outcome`, both of which take
/// the internal locks, so the pool is safe to share across threads.
pub struct ProxyPool {
    /// All proxies, in configuration order. Never shrinks during a run.
    proxies: RwLock<Vec<Proxy>>,
    /// Pool-relevant policy constants.
    config: DispatchConfig,
    /// Next starting index for round-robin tie-breaking.
    cursor: Mutex<usize>,
    /// When the pool last became fully quarantined, if it still is.
    exhausted_since: Mutex<Option<Instant>>,
}

impl ProxyPool {
    /// Create a pool from the configured static proxy list.
    pub fn new(config: DispatchConfig) -> Self {
        let proxies: Vec<Proxy> = config.proxy_list.iter().map(Proxy::new).collect();
        info!("Proxy pool initialized with {} proxies", proxies.len());

        Self {
            proxies: RwLock::new(proxies),
            config,
            cursor: Mutex::new(0),
            exhausted_since: Mutex::new(None),
        }
    }

    /// Select a proxy for the next dispatch. Returns `None` only when the
    /// pool was configured with no proxies at all (direct dispatch).
    pub fn select(&self) -> Option<Proxy> {
        self.select_at(Instant::now())
    }

    /// `select` with an explicit clock, for schedulers and deterministic
    /// tests.
    ///
    /// Policy: proxies whose quarantine has expired re-enter rotation with
    /// their failure count reset; among eligible proxies the least-recently
    /// used wins, round-robin order breaking ties. If every proxy is
    /// quarantined the soonest-expiring one is returned anyway: a crawl must
    /// make forward progress rather than deadlock on proxy exhaustion, so a
    /// just-quarantined proxy can be retried early under total exhaustion.
    pub fn select_at(&self, now: Instant) -> Option<Proxy> {
        let mut proxies = self.proxies.write();
        if proxies.is_empty() {
            return None;
        }

        for proxy in proxies.iter_mut() {
            if proxy.is_quarantined && proxy.is_eligible(now) {
                info!("Proxy {} quarantine expired, back in rotation", proxy.address);
                proxy.lift_quarantine();
            }
        }

        let len = proxies.len();
        let mut cursor = self.cursor.lock();

        let eligible: Vec<usize> = (0..len).filter(|&i| !proxies[i].is_quarantined).collect();

        let index = if eligible.is_empty() {
            // Total exhaustion fallback: earliest-available proxy.
            let mut exhausted = self.exhausted_since.lock();
            if exhausted.is_none() {
                warn!("All {} proxies quarantined, falling back to earliest-available", len);
                *exhausted = Some(now);
            }
            (0..len)
                .min_by_key(|&i| proxies[i].quarantine_until.unwrap_or(now))
                .unwrap_or(0)
        } else {
            *self.exhausted_since.lock() = None;
            let start = *cursor;
            eligible
                .into_iter()
                .min_by_key(|&i| (proxies[i].last_used_at, (i + len - start) % len))
                .unwrap_or(0)
        };

        let proxy = &mut proxies[index];
        proxy.last_used_at = Some(now);
        *cursor = (index + 1) % len;
        debug!("Selected proxy {}", proxy.address);

        Some(proxy.clone())
    }

    /// Record the outcome of a request attempt through `address`.
    pub fn record_outcome(&self, address: &str, outcome: ProxyOutcome) {
        self.record_outcome_at(address, outcome, Instant::now());
    }

    /// `record_outcome` with an explicit clock.
    ///
    /// Success clears the failure streak and any quarantine. Failure
    /// increments the streak; at the quarantine threshold the proxy is
    /// sidelined for an exponentially growing, capped window.
    pub fn record_outcome_at(&self, address: &str, outcome: ProxyOutcome, now: Instant) {
        let mut proxies = self.proxies.write();
        let Some(proxy) = proxies.iter_mut().find(|p| p.address == address) else {
            warn!("Outcome recorded for unknown proxy {address}");
            return;
        };

        match outcome {
            ProxyOutcome::Success => {
                proxy.failure_count = 0;
                proxy.success_count += 1;
                if proxy.is_quarantined {
                    info!("Proxy {} recovered, quarantine cleared", proxy.address);
                }
                proxy.is_quarantined = false;
                proxy.quarantine_until = None;
                *self.exhausted_since.lock() = None;
            }
            ProxyOutcome::Failure => {
                proxy.failure_count += 1;
                if proxy.failure_count >= self.config.quarantine_threshold {
                    let window = self.quarantine_window(proxy.failure_count);
                    if !proxy.is_quarantined {
                        warn!(
                            "Proxy {} quarantined for {:?} after {} consecutive failures",
                            proxy.address, window, proxy.failure_count
                        );
                    }
                    proxy.is_quarantined = true;
                    proxy.quarantine_until = Some(now + window);
                }
            }
        }
    }

    /// Exponential quarantine window, capped at the configured ceiling.
    fn quarantine_window(&self, failure_count: usize) -> Duration {
        let factor = self.config.backoff_multiplier.powi(failure_count as i32);
        let window = self.config.base_delay.mul_f64(factor);
        window.min(self.config.max_quarantine)
    }

    /// How long the pool has been fully quarantined, if it currently is.
    pub fn exhausted_for(&self, now: Instant) -> Option<Duration> {
        let exhausted = self.exhausted_since.lock();
        exhausted.map(|since| now.saturating_duration_since(since))
    }

    /// Look up a proxy by address.
    pub fn get(&self, address: &str) -> Option<Proxy> {
        let proxies = self.proxies.read();
        proxies.iter().find(|p| p.address == address).cloned()
    }

    /// Per-proxy health view for operators.
    pub fn snapshot(&self) -> Vec<ProxyHealth> {
        let now = Instant::now();
        let proxies = self.proxies.read();
        proxies
            .iter()
            .map(|p| ProxyHealth {
                address: p.address.clone(),
                failure_count: p.failure_count,
                success_count: p.success_count,
                is_quarantined: p.is_quarantined,
                quarantine_remaining: p
                    .quarantine_until
                    .and_then(|until| until.checked_duration_since(now)),
            })
            .collect()
    }

    /// (total, currently eligible) proxy counts.
    pub fn stats(&self) -> (usize, usize) {
        let now = Instant::now();
        let proxies = self.proxies.read();
        let total = proxies.len();
        let eligible = proxies.iter().filter(|p| p.is_eligible(now)).count();
        (total, eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;

    fn pool_with(proxies: Vec<&str>, threshold: usize) -> ProxyPool {
        let config = DispatchConfig::builder()
            .proxy_list(proxies)
            .quarantine_threshold(threshold)
            .base_delay(Duration::from_secs(1))
            .build();
        ProxyPool::new(config)
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let pool = pool_with(vec![], 3);
        assert!(pool.select().is_none());
    }

    #[test]
    fn rotates_across_eligible_proxies() {
        let pool = pool_with(vec!["http://a:1", "http://b:1", "http://c:1"], 3);
        let now = Instant::now();

        let first = pool.select_at(now).unwrap();
        let second = pool.select_at(now + Duration::from_millis(1)).unwrap();
        let third = pool.select_at(now + Duration::from_millis(2)).unwrap();

        let picked: std::collections::HashSet<String> =
            [first.address, second.address, third.address].into_iter().collect();
        assert_eq!(picked.len(), 3, "each proxy used once before any repeats");
    }

    #[test]
    fn failure_at_threshold_quarantines() {
        let pool = pool_with(vec!["http://a:1"], 3);
        let now = Instant::now();

        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        assert!(!pool.snapshot()[0].is_quarantined);

        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        let health = &pool.snapshot()[0];
        assert!(health.is_quarantined);
        assert_eq!(health.failure_count, 3);
    }

    #[test]
    fn quarantined_proxy_is_skipped_until_expiry() {
        let pool = pool_with(vec!["http://a:1", "http://b:1"], 1);
        let now = Instant::now();

        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);

        for i in 0..4 {
            let picked = pool.select_at(now + Duration::from_millis(i)).unwrap();
            assert_eq!(picked.address, "http://b:1");
        }

        // base_delay * 2^1 = 2s window; after expiry A is offered again
        // with its failure count reset.
        let later = now + Duration::from_secs(3);
        pool.record_outcome_at("http://b:1", ProxyOutcome::Success, later);
        let addresses: Vec<String> = (0..2)
            .map(|i| pool.select_at(later + Duration::from_millis(i)).unwrap().address)
            .collect();
        assert!(addresses.contains(&"http://a:1".to_string()));
        assert_eq!(pool.snapshot()[0].failure_count, 0);
    }

    #[test]
    fn exhausted_pool_returns_earliest_expiring() {
        let pool = pool_with(vec!["http://a:1", "http://b:1"], 1);
        let now = Instant::now();

        // A fails once (2s window), B fails twice (4s window).
        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        pool.record_outcome_at("http://b:1", ProxyOutcome::Failure, now);
        pool.record_outcome_at("http://b:1", ProxyOutcome::Failure, now);

        let picked = pool.select_at(now + Duration::from_millis(1)).unwrap();
        assert_eq!(picked.address, "http://a:1");
        assert!(pool.exhausted_for(now + Duration::from_millis(1)).is_some());
    }

    #[test]
    fn success_clears_quarantine_and_exhaustion() {
        let pool = pool_with(vec!["http://a:1"], 1);
        let now = Instant::now();

        pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        pool.select_at(now).unwrap();
        assert!(pool.exhausted_for(now).is_some());

        pool.record_outcome_at("http://a:1", ProxyOutcome::Success, now);
        let health = &pool.snapshot()[0];
        assert!(!health.is_quarantined);
        assert_eq!(health.failure_count, 0);
        assert!(pool.exhausted_for(now).is_none());
    }

    #[test]
    fn quarantine_window_is_capped() {
        let config = DispatchConfig::builder()
            .proxy_list(vec!["http://a:1"])
            .quarantine_threshold(1)
            .base_delay(Duration::from_secs(1))
            .max_quarantine(Duration::from_secs(5))
            .build();
        let pool = ProxyPool::new(config);
        let now = Instant::now();

        for _ in 0..10 {
            pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
        }
        let remaining = pool.snapshot()[0].quarantine_remaining.unwrap();
        assert!(remaining <= Duration::from_secs(5));
    }
}
