//! Locators no extraction strategy claims.

use crate::common::{BAD_URL, d7ih_wiki, wiki_registry};
use partcache::{CacheConfig, PartCache, PartError, PartState};
use std::time::Duration;

#[tokio::test]
async fn test_bad_part() {
    let cache = PartCache::new(&CacheConfig::default(), wiki_registry(d7ih_wiki()));
    cache.settings().set_refresh_interval(Duration::from_millis(50));

    let part = cache.get(BAD_URL);
    for _ in 0..3 {
        assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
        assert!(!part.is_resolved());
        let error = part.refresh_exception().expect("failed part carries its error");
        assert!(error.is_extraction_error());
        assert_eq!(
            *error,
            PartError::NoStrategy {
                locator: BAD_URL.to_string()
            }
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.get(BAD_URL);
    }
    assert!(part.identifier().is_none());
}

#[tokio::test]
async fn test_non_url_locator_fails_without_panicking() {
    let cache = PartCache::new(&CacheConfig::default(), wiki_registry(d7ih_wiki()));

    let part = cache.get("not a locator at all");
    assert_eq!(part.locator().as_str(), "not a locator at all");
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert!(matches!(part.refresh_exception().as_deref(), Some(PartError::NoStrategy { .. })));
}

#[tokio::test]
async fn test_missing_wiki_page_is_fetch_failure() {
    let cache = PartCache::new(&CacheConfig::default(), wiki_registry(d7ih_wiki()));

    let part = cache.get("https://github.com/firepick1/FirePick/wiki/NOPE");
    assert_eq!(part.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert!(matches!(part.refresh_exception().as_deref(), Some(PartError::Fetch { .. })));
}
