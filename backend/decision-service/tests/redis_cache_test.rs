//! Redis cache backend tests
//!
//! These tests require a running Redis instance.
//! Run with: cargo test --test redis_cache_test -- --ignored

use decision_service::cache::{RedisTtlCache, TtlCache};
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_clear_removes_only_the_prefix() {
    let cache = RedisTtlCache::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");
    let ttl = Duration::from_secs(60);

    for i in 0..250 {
        cache
            .set(&format!("dtest:pool:{}", i), "{}".to_string(), ttl)
            .await
            .expect("Failed to set key");
    }
    cache
        .set("dtest:keep", "1".to_string(), ttl)
        .await
        .expect("Failed to set key");

    let deleted = cache.clear("dtest:pool:").await.expect("Failed to clear");
    assert_eq!(deleted, 250);
    assert_eq!(cache.get("dtest:pool:7").await.unwrap(), None);
    assert_eq!(cache.get("dtest:keep").await.unwrap(), Some("1".to_string()));

    cache.clear("dtest:").await.expect("Failed to clean up");
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_reads_proceed_while_a_clear_scans() {
    let cache = RedisTtlCache::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");
    let ttl = Duration::from_secs(60);

    for i in 0..20000 {
        cache
            .set(&format!("dscan:bulk:{}", i), "{}".to_string(), ttl)
            .await
            .expect("Failed to set key");
    }
    cache
        .set("dscan:hot", "1".to_string(), ttl)
        .await
        .expect("Failed to set key");

    let clearing = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.clear("dscan:bulk:").await })
    };

    // a read issued mid-scan completes without waiting for the whole clear
    while !clearing.is_finished() {
        let value = tokio::time::timeout(Duration::from_millis(50), cache.get("dscan:hot"))
            .await
            .expect("Read stalled behind the clear")
            .expect("Redis get failed");
        assert_eq!(value, Some("1".to_string()));
    }

    let deleted = clearing.await.unwrap().expect("Failed to clear");
    assert_eq!(deleted, 20000);

    cache.clear("dscan:").await.expect("Failed to clean up");
}
