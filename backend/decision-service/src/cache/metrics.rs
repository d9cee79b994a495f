//! Cache metrics for observability

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static CACHE_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_cache_operations_total",
        "Cache operations by entity and result",
        &["entity", "result"]
    )
    .expect("Failed to register cache operations metric")
});

/// Extract entity type from cache key for metrics labeling
fn extract_entity(key: &str) -> &str {
    // Format: v{N}:{entity}:...
    key.split(':').nth(1).unwrap_or("unknown")
}

#[derive(Clone, Copy, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn record_hit(&self, key: &str) {
        self.record(key, "hit");
    }

    pub fn record_miss(&self, key: &str) {
        self.record(key, "miss");
    }

    pub fn record_write(&self, key: &str) {
        self.record(key, "write");
    }

    pub fn record_clear(&self, prefix: &str) {
        self.record(prefix, "clear");
    }

    pub fn record_error(&self, key: &str) {
        self.record(key, "error");
    }

    fn record(&self, key: &str, result: &str) {
        CACHE_OPERATIONS
            .with_label_values(&[extract_entity(key), result])
            .inc();
    }
}
