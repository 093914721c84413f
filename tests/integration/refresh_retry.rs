//! Staleness, failure capture and retry.

use crate::common::{cache_with, d7ih_stub, wiki};
use partcache::extract::RawPart;
use partcache::{PartError, PartState};
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(100);

/// A part given a synthetic failure goes stale after the refresh interval,
/// and the next lookup retries it until it is resolved again.
#[tokio::test]
async fn test_temporarily_bad_part() {
    let stub = d7ih_stub();
    let cache = cache_with(&stub);
    cache.settings().set_refresh_interval(INTERVAL);

    let part = cache.get(wiki("X50K"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    assert!(part.is_fresh());

    part.set_refresh_exception(PartError::injected("dummy"));
    assert!(!part.is_resolved());
    assert_eq!(part.refresh_exception().unwrap().to_string(), "dummy");
    assert_eq!(part.identifier().as_deref(), Some("X50K"), "last good fields are kept");

    tokio::time::sleep(INTERVAL + Duration::from_millis(20)).await;
    assert!(!part.is_fresh());

    let again = cache.get(wiki("X50K"));
    assert!(Arc::ptr_eq(&part, &again));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    assert!(part.refresh_exception().is_none());
    assert!(part.is_fresh());
    assert_eq!(stub.calls(&wiki("X50K")), 2);
}

#[tokio::test]
async fn test_retry_is_rate_limited() {
    let stub = d7ih_stub();
    stub.set_failure(&wiki("F510"), PartError::injected("connection reset"));
    let cache = cache_with(&stub);
    cache.settings().set_refresh_interval(Duration::from_millis(200));

    let part = cache.get(wiki("F510"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);

    for _ in 0..10 {
        let same = cache.get(wiki("F510"));
        assert!(Arc::ptr_eq(&part, &same));
        assert_eq!(same.state(), PartState::Failed);
    }
    assert_eq!(stub.calls(&wiki("F510")), 1);
}

#[tokio::test]
async fn test_stale_part_keeps_fields_while_refreshing() {
    let stub = d7ih_stub();
    let cache = cache_with(&stub);
    cache.settings().set_refresh_interval(INTERVAL);

    let part = cache.get(wiki("DB16"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);

    stub.set_delay(Duration::from_millis(200));
    stub.set_part(&wiki("DB16"), RawPart::from_package("DB16", 1.75, 1));
    tokio::time::sleep(INTERVAL + Duration::from_millis(20)).await;

    cache.get(wiki("DB16"));
    assert_eq!(part.state(), PartState::Resolving);
    assert_eq!(part.package_cost(), Some(1.50));

    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    assert_eq!(part.package_cost(), Some(1.75));
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_known_good() {
    let stub = d7ih_stub();
    let cache = cache_with(&stub);
    cache.settings().set_refresh_interval(INTERVAL);

    let part = cache.get(wiki("F50N"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);

    stub.set_failure(&wiki("F50N"), PartError::injected("vendor site down"));
    tokio::time::sleep(INTERVAL + Duration::from_millis(20)).await;
    cache.get(wiki("F50N"));

    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert_eq!(part.identifier().as_deref(), Some("F50N"));
    assert_eq!(part.unit_cost(), Some(0.0173));
    assert!(part.refresh_exception().is_some());
}

#[tokio::test]
async fn test_slow_extraction_times_out() {
    let stub = d7ih_stub();
    stub.set_delay(Duration::from_millis(500));
    let cache = cache_with(&stub);
    cache.settings().set_extraction_timeout(Duration::from_millis(50));

    let part = cache.get(wiki("F525"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert!(matches!(part.refresh_exception().as_deref(), Some(PartError::Timeout { .. })));
}

#[tokio::test]
async fn test_panicking_strategy_is_contained() {
    let stub = d7ih_stub();
    stub.set_panic(&wiki("DB16"));
    let cache = cache_with(&stub);

    let bad = cache.get(wiki("DB16"));
    let good = cache.get(wiki("F525"));
    assert_eq!(bad.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert!(matches!(
        bad.refresh_exception().as_deref(),
        Some(PartError::ExtractorPanicked { .. })
    ));
    assert_eq!(good.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
}

/// Shortening the refresh interval applies to a part that already failed
/// under the old interval.
#[tokio::test]
async fn test_shortened_interval_reaches_failed_part() {
    let stub = d7ih_stub();
    stub.set_failure(&wiki("F525"), PartError::injected("vendor site down"));
    let cache = cache_with(&stub);

    let part = cache.get(wiki("F525"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert!(part.is_fresh(), "the default interval keeps the failure fresh");

    stub.set_part(&wiki("F525"), RawPart::from_package("F525", 0.11, 1));
    cache.settings().set_refresh_interval(Duration::from_millis(50));
    assert_eq!(part.refresh_interval(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let again = cache.get(wiki("F525"));
    assert!(Arc::ptr_eq(&part, &again));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    assert_eq!(stub.calls(&wiki("F525")), 2);
}
