use super::{CacheMetrics, CacheResult, TtlCache};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Process-local TTL cache. Expired entries are evicted lazily on read.
#[derive(Clone, Default)]
pub struct InMemoryTtlCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
    metrics: CacheMetrics,
}

impl InMemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl TtlCache for InMemoryTtlCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => Some(entry.0.clone()),
            Some(_) => None,
            None => {
                self.metrics.record_miss(key);
                return Ok(None);
            }
        };

        match hit {
            Some(value) => {
                self.metrics.record_hit(key);
                Ok(Some(value))
            }
            None => {
                // remove only if still expired; a concurrent set may have refreshed it
                self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
                debug!(key = %key, "Cache entry expired");
                self.metrics.record_miss(key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        self.metrics.record_write(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        self.metrics.record_clear(prefix);
        debug!(prefix = %prefix, removed, "Cache cleared");
        Ok(removed)
    }
}
