// ============================================
// Candidate Pool Cache
// ============================================
//
// Fingerprint (scenario, task, context) → validated raw candidates.
// Cache reads never fail the request: a backend error is a miss, a
// source error is an empty pool (which the gate turns into a fallback).

mod source;

pub use source::{
    CandidateSource, CatalogFile, CatalogWeights, SourceError, StaticCandidateSource,
};

use crate::cache::{CacheKey, TtlCache};
use crate::models::{ContextSpec, RawCandidate, Scenario, TaskSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Raw candidates for one fingerprint
#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub fingerprint: String,
    pub candidates: Vec<RawCandidate>,
    /// When the candidates were sourced; recency is scored against it
    pub fetched_at: DateTime<Utc>,
    pub cache_hit: bool,
}

#[derive(Serialize, Deserialize)]
struct CachedPool {
    candidates: Vec<RawCandidate>,
    fetched_at: DateTime<Utc>,
}

/// SHA-256 over the canonical JSON of scenario, task and context.
/// serde_json maps are key-ordered, so field order in the request does not matter.
pub fn fingerprint(scenario: Scenario, task: Option<&TaskSpec>, context: &ContextSpec) -> String {
    let canonical = serde_json::json!({
        "scenario": scenario,
        "task": task,
        "context": context,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Drop candidates that fail validation or repeat an earlier id
pub fn validate_candidates(scenario: Scenario, candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
    let mut seen = HashSet::new();
    let input_count = candidates.len();

    let valid: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|c| match c.validate_for(scenario) {
            Ok(()) => true,
            Err(reason) => {
                warn!(candidate_id = %c.id, %scenario, reason = %reason, "Dropping invalid candidate");
                false
            }
        })
        .filter(|c| {
            let first = seen.insert(c.id.clone());
            if !first {
                warn!(candidate_id = %c.id, %scenario, "Dropping duplicate candidate");
            }
            first
        })
        .collect();

    debug!(input_count, output_count = valid.len(), "Candidate validation completed");
    valid
}

#[derive(Clone)]
pub struct CandidatePoolCache {
    backend: Arc<dyn TtlCache>,
    source: Arc<dyn CandidateSource>,
    ttl: Duration,
}

impl CandidatePoolCache {
    pub fn new(backend: Arc<dyn TtlCache>, source: Arc<dyn CandidateSource>, ttl: Duration) -> Self {
        Self {
            backend,
            source,
            ttl,
        }
    }

    pub async fn get_or_fetch(
        &self,
        scenario: Scenario,
        task: Option<&TaskSpec>,
        context: &ContextSpec,
    ) -> CandidatePool {
        let fp = fingerprint(scenario, task, context);
        let key = CacheKey::pool(scenario, &fp);

        match self.backend.get(&key).await {
            Ok(Some(data)) => match serde_json::from_str::<CachedPool>(&data) {
                Ok(cached) => {
                    debug!(key = %key, count = cached.candidates.len(), "Candidate pool cache hit");
                    return CandidatePool {
                        fingerprint: fp,
                        candidates: cached.candidates,
                        fetched_at: cached.fetched_at,
                        cache_hit: true,
                    };
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cached pool"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Pool cache read failed, treating as miss"),
        }

        let fetched_at = Utc::now();
        let candidates = match self.source.fetch(scenario, task, context).await {
            Ok(raw) => validate_candidates(scenario, raw),
            Err(e) => {
                warn!(%scenario, error = %e, "Candidate source failed, continuing with an empty pool");
                return CandidatePool {
                    fingerprint: fp,
                    candidates: Vec::new(),
                    fetched_at,
                    cache_hit: false,
                };
            }
        };

        let cached = CachedPool {
            candidates,
            fetched_at,
        };
        match serde_json::to_string(&cached) {
            Ok(data) => {
                if let Err(e) = self.backend.set(&key, data, self.ttl).await {
                    warn!(key = %key, error = %e, "Pool cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Pool serialization failed"),
        }

        CandidatePool {
            fingerprint: fp,
            candidates: cached.candidates,
            fetched_at,
            cache_hit: false,
        }
    }

    /// Administrative invalidation of every cached pool
    pub async fn clear(&self) -> usize {
        match self.backend.clear(&CacheKey::pool_prefix()).await {
            Ok(removed) => {
                info!(removed, "Candidate pool cache cleared");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Candidate pool cache clear failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryTtlCache;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: StaticCandidateSource,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CandidateSource for CountingSource {
        async fn fetch(
            &self,
            scenario: Scenario,
            task: Option<&TaskSpec>,
            context: &ContextSpec,
        ) -> Result<Vec<RawCandidate>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(scenario, task, context).await
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl CandidateSource for FailingSource {
        async fn fetch(
            &self,
            _scenario: Scenario,
            _task: Option<&TaskSpec>,
            _context: &ContextSpec,
        ) -> Result<Vec<RawCandidate>, SourceError> {
            Err(SourceError::Unavailable("catalog offline".into()))
        }
    }

    fn prompt(id: &str) -> RawCandidate {
        serde_json::from_value(json!({
            "id": id,
            "profile": {"targetType": "prompt", "templateKey": id}
        }))
        .unwrap()
    }

    fn task() -> TaskSpec {
        TaskSpec {
            subject_ref: "job-1".into(),
            category: Some("ads".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fingerprint_ignores_field_order() {
        let a: ContextSpec = serde_json::from_value(json!({"region": "eu", "channel": "web"})).unwrap();
        let b: ContextSpec = serde_json::from_value(json!({"channel": "web", "region": "eu"})).unwrap();
        let t = task();

        assert_eq!(
            fingerprint(Scenario::Prompt, Some(&t), &a),
            fingerprint(Scenario::Prompt, Some(&t), &b)
        );
        assert_ne!(
            fingerprint(Scenario::Prompt, Some(&t), &a),
            fingerprint(Scenario::Style, Some(&t), &a)
        );
    }

    #[test]
    fn test_validation_drops_invalid_and_duplicates() {
        let mut wrong_type = prompt("m1");
        wrong_type.profile = serde_json::from_value(
            json!({"targetType": "model", "provider": "openai", "model": "gpt-4o"}),
        )
        .unwrap();

        let valid = validate_candidates(
            Scenario::Prompt,
            vec![prompt("p1"), prompt("p1"), wrong_type, prompt("p2")],
        );

        let ids: Vec<_> = valid.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache_until_cleared() {
        let source = Arc::new(CountingSource {
            inner: StaticCandidateSource::default()
                .with_candidates(Scenario::Prompt, vec![prompt("p1"), prompt("p2")]),
            calls: AtomicUsize::new(0),
        });
        let pool = CandidatePoolCache::new(
            Arc::new(InMemoryTtlCache::new()),
            source.clone(),
            Duration::from_secs(60),
        );
        let t = task();
        let ctx = ContextSpec::default();

        let first = pool.get_or_fetch(Scenario::Prompt, Some(&t), &ctx).await;
        let second = pool.get_or_fetch(Scenario::Prompt, Some(&t), &ctx).await;

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.fetched_at, second.fetched_at);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(pool.clear().await, 1);
        let third = pool.get_or_fetch(Scenario::Prompt, Some(&t), &ctx).await;
        assert!(!third.cache_hit);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_failure_yields_empty_pool() {
        let pool = CandidatePoolCache::new(
            Arc::new(InMemoryTtlCache::new()),
            Arc::new(FailingSource),
            Duration::from_secs(60),
        );

        let result = pool
            .get_or_fetch(Scenario::Model, None, &ContextSpec::default())
            .await;

        assert!(result.candidates.is_empty());
        assert!(!result.cache_hit);
    }
}
