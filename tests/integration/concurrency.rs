//! Single creation and single refresh under concurrent lookups.

use crate::common::{D7IH, cache_with, d7ih_stub, wiki};
use partcache::extract::{ExtractorRegistry, RawPart};
use partcache::test_utils::StubExtractor;
use partcache::{CacheConfig, PartCache, PartState};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_lookups_create_one_part() {
    let stub = d7ih_stub();
    stub.set_delay(Duration::from_millis(50));
    let cache = cache_with(&stub);

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(D7IH) })
        })
        .collect();

    let mut parts = Vec::new();
    for handle in handles {
        parts.push(handle.await.unwrap());
    }
    assert!(parts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

    assert_eq!(parts[0].wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    assert_eq!(stub.calls(D7IH), 1);
    assert_eq!(stub.max_concurrent(D7IH), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_part_refreshed_once_under_contention() {
    let stub = d7ih_stub();
    let cache = cache_with(&stub);
    cache.settings().set_refresh_interval(Duration::from_millis(50));

    let part = cache.get(wiki("X50K"));
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Resolved);
    stub.set_delay(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(70)).await;

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(wiki("X50K")) })
        })
        .collect();
    for handle in handles {
        assert!(Arc::ptr_eq(&part, &handle.await.unwrap()));
    }

    part.wait_settled(Duration::from_secs(5)).await;
    assert_eq!(stub.calls(&wiki("X50K")), 2);
    assert_eq!(stub.max_concurrent(&wiki("X50K")), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_locators_refresh_in_parallel() {
    let stub = Arc::new(StubExtractor::new().with_delay(Duration::from_millis(200)));
    let locators: Vec<String> = (0..8).map(|i| format!("https://example.com/p/{i}")).collect();
    for (i, locator) in locators.iter().enumerate() {
        stub.set_part(locator, RawPart::from_package(format!("P{i}"), 1.0, 1));
    }
    let config = CacheConfig {
        max_parallel: 8,
        ..CacheConfig::default()
    };
    let cache = PartCache::new(&config, ExtractorRegistry::new().with(stub.clone()));

    let started = Instant::now();
    let parts = futures::future::join_all(
        locators.iter().map(|l| cache.resolve_tree(l.as_str(), Duration::from_secs(5))),
    )
    .await;
    assert!(parts.iter().all(|p| p.is_resolved()));
    assert!(started.elapsed() < Duration::from_millis(1200), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let stub = Arc::new(StubExtractor::new().with_delay(Duration::from_millis(100)));
    let locators: Vec<String> = (0..6).map(|i| format!("https://example.com/q/{i}")).collect();
    for locator in &locators {
        stub.set_part(locator, RawPart::from_package("Q", 1.0, 1));
    }
    let config = CacheConfig {
        max_parallel: 2,
        ..CacheConfig::default()
    };
    let cache = PartCache::new(&config, ExtractorRegistry::new().with(stub.clone()));

    let started = Instant::now();
    let parts = futures::future::join_all(
        locators.iter().map(|l| cache.resolve_tree(l.as_str(), Duration::from_secs(5))),
    )
    .await;
    assert!(parts.iter().all(|p| p.is_resolved()));
    assert!(started.elapsed() >= Duration::from_millis(300), "took {:?}", started.elapsed());
    assert_eq!(stub.total_calls(), 6);
}
