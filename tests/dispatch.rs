//! End-to-end dispatch scenarios through the public API.

use crawl_dispatch::{
    DispatchConfig, DispatchError, Disposition, FailureKind, NetworkErrorKind, ProxyOutcome,
    RequestContext, RequestDispatchMiddleware,
};
use std::time::{Duration, Instant};

const TIMEOUT: FailureKind = FailureKind::Network(NetworkErrorKind::Timeout);

fn ctx() -> RequestContext {
    RequestContext::new("https://alkoteka.com/catalog/vino").unwrap()
}

#[test]
fn region_identity_present_after_dispatch_and_caller_values_survive() {
    let config = DispatchConfig::builder()
        .region("krasnodar")
        .proxy_list(vec!["http://10.0.0.1:8080"])
        .build();
    let middleware = RequestDispatchMiddleware::new(config);

    let mut ctx = ctx();
    ctx.cookies.insert("city".into(), "custom".into());
    middleware.before_send(&mut ctx).unwrap();

    assert_eq!(ctx.cookies["city"], "custom");
    assert_eq!(ctx.cookies["selected_region"], "krasnodar");
    assert_eq!(ctx.headers["X-Region"], "Krasnodar");
    assert_eq!(middleware.current_region(), "krasnodar");
}

#[test]
fn two_failures_quarantine_a_and_selection_avoids_it_until_expiry() {
    let config = DispatchConfig::builder()
        .proxy_list(vec!["http://a:1", "http://b:1", "http://c:1"])
        .quarantine_threshold(2)
        .base_delay(Duration::from_secs(1))
        .build();
    let middleware = RequestDispatchMiddleware::new(config);
    let pool = middleware.pool();
    let now = Instant::now();

    pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
    pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);

    let quarantined: Vec<_> = middleware
        .pool_snapshot()
        .into_iter()
        .filter(|p| p.is_quarantined)
        .map(|p| p.address)
        .collect();
    assert_eq!(quarantined, vec!["http://a:1".to_string()]);

    // Window is base_delay * 2^2 = 4s; A must not be offered before that.
    for i in 0..6 {
        let picked = pool.select_at(now + Duration::from_millis(i)).unwrap();
        assert_ne!(picked.address, "http://a:1");
    }

    let after_expiry = now + Duration::from_secs(5);
    let picked: Vec<String> = (0..3)
        .map(|i| pool.select_at(after_expiry + Duration::from_millis(i)).unwrap().address)
        .collect();
    assert!(picked.contains(&"http://a:1".to_string()));
}

#[test]
fn four_failures_yield_three_retries_then_exhaustion() {
    let config = DispatchConfig::builder()
        .proxy_list(vec!["http://a:1"])
        .max_retries(3)
        .quarantine_threshold(3)
        .base_delay(Duration::from_millis(10))
        .build();
    let middleware = RequestDispatchMiddleware::with_seed(config, 42);
    let now = Instant::now();

    let mut ctx = ctx();
    let mut retries = 0;
    let error = loop {
        middleware.before_send_at(&mut ctx, now).unwrap();
        match middleware.on_error_at(&mut ctx, TIMEOUT, now) {
            Disposition::Retry { .. } => retries += 1,
            Disposition::Drop { error } => break error,
            Disposition::Accept => panic!("failure cannot be accepted"),
        }
    };

    assert_eq!(retries, 3);
    match error {
        DispatchError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert_eq!(last, TIMEOUT);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(middleware.pool_snapshot()[0].failure_count, 4);
}

#[test]
fn fully_quarantined_pool_still_serves_earliest_expiring() {
    let config = DispatchConfig::builder()
        .proxy_list(vec!["http://a:1", "http://b:1", "http://c:1"])
        .quarantine_threshold(1)
        .base_delay(Duration::from_secs(1))
        .build();
    let middleware = RequestDispatchMiddleware::new(config);
    let pool = middleware.pool();
    let now = Instant::now();

    // A fails once, B twice, C three times: A expires soonest.
    pool.record_outcome_at("http://a:1", ProxyOutcome::Failure, now);
    for _ in 0..2 {
        pool.record_outcome_at("http://b:1", ProxyOutcome::Failure, now);
    }
    for _ in 0..3 {
        pool.record_outcome_at("http://c:1", ProxyOutcome::Failure, now);
    }

    let picked = pool.select_at(now + Duration::from_millis(1)).unwrap();
    assert_eq!(picked.address, "http://a:1");
}

#[test]
fn retry_switches_proxy_and_reapplies_region() {
    let config = DispatchConfig::builder()
        .proxy_list(vec!["http://a:1", "http://b:1"])
        .quarantine_threshold(1)
        .max_retries(3)
        .build();
    let middleware = RequestDispatchMiddleware::with_seed(config, 7);
    let now = Instant::now();

    let mut ctx = ctx();
    middleware.before_send_at(&mut ctx, now).unwrap();
    let first = ctx.assigned_proxy.clone().unwrap();

    let disposition = middleware.on_error_at(&mut ctx, TIMEOUT, now);
    assert!(matches!(disposition, Disposition::Retry { .. }));

    middleware
        .before_send_at(&mut ctx, now + Duration::from_millis(1))
        .unwrap();
    let second = ctx.assigned_proxy.clone().unwrap();

    assert_ne!(first, second, "quarantined proxy must not be reused");
    assert_eq!(ctx.cookies["city"], "krasnodar");
    assert_eq!(ctx.attempt, 1);
}

#[test]
fn upstream_rejection_penalizes_proxy_and_retries() {
    let config = DispatchConfig::builder()
        .proxy_list(vec!["http://a:1", "http://b:1"])
        .quarantine_threshold(3)
        .build();
    let middleware = RequestDispatchMiddleware::with_seed(config, 7);
    let now = Instant::now();

    let mut ctx = ctx();
    middleware.before_send_at(&mut ctx, now).unwrap();
    let used = ctx.assigned_proxy.clone().unwrap();

    let disposition = middleware.on_response_at(&mut ctx, 429, now);
    assert!(matches!(disposition, Disposition::Retry { .. }));

    let health = middleware
        .pool_snapshot()
        .into_iter()
        .find(|p| p.address == used)
        .unwrap();
    assert_eq!(health.failure_count, 1);
}
