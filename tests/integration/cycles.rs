//! Bills of materials that require themselves.

use partcache::extract::{ExtractorRegistry, RawPart, SubPartRef};
use partcache::test_utils::StubExtractor;
use partcache::{CacheConfig, PartCache, PartError, PartState};
use std::sync::Arc;
use std::time::Duration;

const A: &str = "https://example.com/parts/A";
const B: &str = "https://example.com/parts/B";
const C: &str = "https://example.com/parts/C";

fn assembly(id: &str, children: &[&str]) -> RawPart {
    children.iter().fold(RawPart::from_package(id, children.len() as f64, 1), |raw, child| {
        raw.with_sub_part(SubPartRef::new(*child, 1, 1.0))
    })
}

fn cache(stub: &Arc<StubExtractor>) -> PartCache {
    PartCache::new(&CacheConfig::default(), ExtractorRegistry::new().with(stub.clone()))
}

fn chain_of(error: Option<Arc<PartError>>) -> String {
    match error.as_deref() {
        Some(PartError::CycleDetected { chain }) => chain.clone(),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_self_reference_fails_fast() {
    let stub = Arc::new(StubExtractor::new());
    stub.set_part(A, assembly("A", &[A]));
    let cache = cache(&stub);

    let part = cache.resolve_tree(A, Duration::from_secs(5)).await;
    assert_eq!(part.state(), PartState::Failed);
    assert_eq!(chain_of(part.refresh_exception()), format!("{A} → {A}"));
    assert_eq!(stub.calls(A), 1);
}

#[tokio::test]
async fn test_mutual_reference_fails_closing_part() {
    let stub = Arc::new(StubExtractor::new());
    stub.set_part(A, assembly("A", &[B]));
    stub.set_part(B, assembly("B", &[A]));
    let cache = cache(&stub);

    let a = cache.resolve_tree(A, Duration::from_secs(5)).await;
    assert!(a.is_resolved());
    let b = a.required_parts()[0].part().clone();
    assert_eq!(b.state(), PartState::Failed);
    assert_eq!(chain_of(b.refresh_exception()), format!("{A} → {B} → {A}"));
    assert_eq!(stub.calls(A), 1, "the cycle must not re-extract A");
}

#[tokio::test]
async fn test_transitive_cycle_is_reported_with_full_chain() {
    let stub = Arc::new(StubExtractor::new());
    stub.set_part(A, assembly("A", &[B]));
    stub.set_part(B, assembly("B", &[C]));
    stub.set_part(C, assembly("C", &[A]));
    let cache = cache(&stub);

    let a = cache.resolve_tree(A, Duration::from_secs(5)).await;
    let b = a.required_parts()[0].part().clone();
    let c = b.required_parts()[0].part().clone();
    assert!(a.is_resolved() && b.is_resolved());
    assert_eq!(chain_of(c.refresh_exception()), format!("{A} → {B} → {C} → {A}"));
}

#[tokio::test]
async fn test_cycle_through_previously_resolved_tree() {
    let stub = Arc::new(StubExtractor::new());
    stub.set_part(A, assembly("A", &[B]));
    stub.set_part(B, assembly("B", &[]));
    let cache = cache(&stub);
    cache.settings().set_refresh_interval(Duration::from_millis(50));

    let a = cache.resolve_tree(A, Duration::from_secs(5)).await;
    assert!(a.is_resolved());

    // B now declares A; refreshing B from its own root must notice that A
    // already leads back to B.
    stub.set_part(B, assembly("B", &[A]));
    tokio::time::sleep(Duration::from_millis(80)).await;
    let b = cache.get(B);
    assert_eq!(b.wait_settled(Duration::from_secs(5)).await, PartState::Failed);
    assert_eq!(chain_of(b.refresh_exception()), format!("{B} → {A} → {B}"));
}
