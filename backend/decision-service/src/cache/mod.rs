//! TTL key/value caches backing the candidate pool and decision caches
//!
//! Values are opaque JSON strings. Callers treat every backend error as a
//! miss, so a flaky cache only costs a recompute.

mod keys;
mod memory;
mod metrics;
mod redis_cache;

pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::InMemoryTtlCache;
pub use metrics::CacheMetrics;
pub use redis_cache::RedisTtlCache;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait::async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Remove every key starting with `prefix`; returns how many were removed
    async fn clear(&self, prefix: &str) -> CacheResult<usize>;
}
