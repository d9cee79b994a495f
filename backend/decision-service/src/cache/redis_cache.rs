use super::{CacheError, CacheMetrics, CacheResult, TtlCache};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Redis-backed TTL cache, for deployments running more than one instance
#[derive(Clone)]
pub struct RedisTtlCache {
    redis: SharedRedis,
    metrics: CacheMetrics,
}

impl RedisTtlCache {
    pub fn new(redis: SharedRedis) -> Self {
        Self {
            redis,
            metrics: CacheMetrics,
        }
    }

    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }
}

#[async_trait::async_trait]
impl TtlCache for RedisTtlCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => {
                self.metrics.record_hit(key);
                Ok(Some(data))
            }
            Ok(None) => {
                self.metrics.record_miss(key);
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                self.metrics.record_error(key);
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| {
                self.metrics.record_error(key);
                CacheError::Redis(e)
            })?;

        debug!(key = %key, ttl = ttl_secs, "Cache set");
        self.metrics.record_write(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = format!("{}*", prefix);
        // the manager multiplexes; a clone keeps the scan off the shared lock
        let mut conn = self.redis.lock().await.clone();
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // SCAN, not KEYS, so a large keyspace does not block the server
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut conn).await?;
                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        self.metrics.record_clear(prefix);
        debug!(pattern = %pattern, deleted = total_deleted, "Cache scan delete");
        Ok(total_deleted)
    }
}
