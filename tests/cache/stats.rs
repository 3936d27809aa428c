//! Statistics arithmetic and the memory breakdown.

use batchline_cache::{Cache, CacheConfig, EvictionPolicy, SetOptions};

fn hot_cache(budget: usize) -> Cache {
    Cache::new(
        CacheConfig::builder()
            .name("stats-tests")
            .memory_budget(budget)
            .eviction_policy(EvictionPolicy::Lru)
            .disk_enabled(false)
            .prefetch_enabled(false)
            .build(),
    )
}

#[tokio::test]
async fn hit_rate_equals_hits_over_lookups() {
    let cache = hot_cache(1024 * 1024);

    cache.set("a", b"1".to_vec(), SetOptions::default()).await.unwrap();
    cache.set("b", b"2".to_vec(), SetOptions::default()).await.unwrap();

    cache.get("a").await.unwrap();
    cache.get("a").await.unwrap();
    cache.get("b").await.unwrap();
    assert!(cache.get("missing").await.is_none());

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    let expected = stats.hits as f64 / (stats.hits + stats.misses) as f64;
    assert!((stats.hit_rate - expected).abs() < f64::EPSILON);
}

#[tokio::test]
async fn byte_and_entry_counters_track_contents() {
    let cache = hot_cache(1024 * 1024);

    cache.set("a", vec![0u8; 100], SetOptions::default()).await.unwrap();
    cache.set("b", vec![0u8; 300], SetOptions::default()).await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.bytes, 400);
    assert_eq!(stats.entry_count, 2);

    cache.delete("a").await.unwrap();
    let stats = cache.stats();
    assert_eq!(stats.bytes, 300);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test]
async fn memory_usage_breaks_down_entry_sizes() {
    let cache = hot_cache(1000);

    cache.set("small", vec![0u8; 100], SetOptions::default()).await.unwrap();
    cache.set("large", vec![0u8; 400], SetOptions::default()).await.unwrap();

    let usage = cache.memory_usage();
    assert_eq!(usage.total_entries, 2);
    assert_eq!(usage.total_size_bytes, 500);
    assert_eq!(usage.average_entry_size, 250);
    assert_eq!(usage.largest_entry_size, 400);
    assert_eq!(usage.smallest_entry_size, 100);
    assert_eq!(usage.budget_bytes, 1000);
    assert!((usage.usage_percent - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn hit_latency_is_tracked_for_hits() {
    let cache = hot_cache(1024 * 1024);
    cache.set("k", b"v".to_vec(), SetOptions::default()).await.unwrap();
    cache.get("k").await.unwrap();
    // Latency is non-negative and finite; the exact value is timing-
    // dependent.
    let stats = cache.stats();
    assert!(stats.avg_hit_latency_ms >= 0.0);
    assert!(stats.avg_hit_latency_ms.is_finite());
}

#[tokio::test]
async fn eviction_counter_matches_observed_evictions() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    let cache = Cache::new(
        CacheConfig::builder()
            .name("eviction-counter")
            .memory_budget(500)
            .eviction_policy(EvictionPolicy::Lru)
            .disk_enabled(false)
            .prefetch_enabled(false)
            .on_eviction(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    for i in 0..10 {
        cache
            .set(&format!("k{i}"), vec![0u8; 100], SetOptions::default())
            .await
            .unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.evictions as usize, observed.load(Ordering::SeqCst));
    assert!(stats.evictions >= 5);
}
