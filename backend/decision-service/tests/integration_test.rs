use decision_service::bootstrap::{build_state, Wiring};
use decision_service::cache::InMemoryTtlCache;
use decision_service::handlers::AppState;
use decision_service::models::{
    Bucket, CandidateSet, Decision, DecisionMode, DecisionStats, Event, EventType, Feedback,
    FeedbackRequest, Outcome, OutcomePatch, RankRequest, RemovalReason, SettingUpdate,
};
use decision_service::services::candidate_pool::CatalogFile;
use decision_service::store::{
    DecisionStore, InMemoryStore, RecordOutcome, StoreError, StoreResult,
};
use decision_service::{AppError, Config};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn style(id: &str, score: f64) -> serde_json::Value {
    json!({
        "id": id,
        "category": "retail",
        "signals": {"relevance": score, "quality": score, "diversity": score},
        "profile": {"targetType": "style", "styleKey": id}
    })
}

fn styled(id: &str, category: &str, score: f64) -> serde_json::Value {
    let mut style = style(id, score);
    style["category"] = json!(category);
    style
}

fn model(id: &str, provider: &str, score: f64) -> serde_json::Value {
    json!({
        "id": id,
        "capabilities": {"provider": provider, "jsonMode": true, "estCostUsd": 0.001, "estLatencyMs": 800},
        "signals": {"relevance": score, "quality": score, "diversity": score},
        "profile": {"targetType": "model", "provider": provider, "model": id}
    })
}

fn catalog() -> CatalogFile {
    serde_json::from_value(json!({
        "candidates": {
            "style": [style("C", 0.3), style("A", 0.9), style("B", 0.7)],
            "model": [model("sonnet", "anthropic", 0.9), model("haiku", "anthropic", 0.6)]
        }
    }))
    .unwrap()
}

fn rank_request(scenario: &str, explore: bool) -> RankRequest {
    rank_for(scenario, "job-42", explore)
}

fn rank_for(scenario: &str, subject: &str, explore: bool) -> RankRequest {
    serde_json::from_value(json!({
        "scenario": scenario,
        "task": {"subjectRef": subject, "category": "retail"},
        "options": {"explore": explore}
    }))
    .unwrap()
}

fn seeded(store: Arc<InMemoryStore>, seed: u64) -> AppState {
    seeded_with(store, seed, catalog())
}

fn seeded_with(store: Arc<InMemoryStore>, seed: u64, catalog: CatalogFile) -> AppState {
    let config = Config::default();
    let cache = Arc::new(InMemoryTtlCache::new());
    let mut wiring =
        Wiring::with_backends(&config, catalog, store.clone(), store, cache.clone(), cache);
    wiring.rng = Some(StdRng::seed_from_u64(seed));
    build_state(&config, wiring)
}

async fn tune(state: &AppState, scenario: &str, update: serde_json::Value) {
    let update: SettingUpdate = serde_json::from_value(update).unwrap();
    state
        .settings
        .upsert(scenario.parse().unwrap(), update)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_coarse_cut_keeps_extras_out_of_top_k() {
    let state = seeded(Arc::new(InMemoryStore::new()), 1);
    tune(&state, "style", json!({"mCoarse": 2, "kFine": 2})).await;

    let response = state.engine.rank(rank_request("style", false)).await.unwrap();

    let top_k: Vec<_> = response.top_k.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(top_k, vec!["A", "B"]);
    assert_eq!(response.chosen.id, "A");
    assert_eq!(response.mode, DecisionMode::Exploit);
    assert!(response.explore_flags.disabled_by_request);

    let extras: Vec<_> = response
        .alternatives
        .coarse_extras
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(extras, vec!["C"]);
    assert_eq!(response.alternatives.fine_top2.unwrap().id, "B");
}

#[tokio::test]
async fn test_explore_rate_converges() {
    let state = seeded(Arc::new(InMemoryStore::new()), 7);
    tune(&state, "style", json!({"epsilon": 0.2, "minExplore": 0.05})).await;

    let runs = 2000;
    let mut explored = 0;
    for _ in 0..runs {
        let response = state.engine.rank(rank_request("style", true)).await.unwrap();
        if response.mode == DecisionMode::Explore {
            explored += 1;
            assert_ne!(response.chosen.id, "A");
        }

        let details = state.engine.decision_details(response.decision_id).await.unwrap();
        assert!(details.candidate_set.contains(&response.chosen.id));
    }

    let rate = explored as f64 / runs as f64;
    assert!((rate - 0.2).abs() < 0.04, "explore rate {}", rate);

    let snapshot = state.engine.metrics().snapshot(Utc::now());
    assert_eq!(snapshot.total, runs as u64);
}

#[tokio::test]
async fn test_same_seed_same_decisions() {
    let first = seeded(Arc::new(InMemoryStore::new()), 99);
    let second = seeded(Arc::new(InMemoryStore::new()), 99);
    for state in [&first, &second] {
        tune(state, "style", json!({"epsilon": 0.5})).await;
    }

    for _ in 0..50 {
        let a = first.engine.rank(rank_request("style", true)).await.unwrap();
        let b = second.engine.rank(rank_request("style", true)).await.unwrap();
        assert_eq!(a.chosen.id, b.chosen.id);
        assert_eq!(a.mode, b.mode);
        assert_eq!(a.explore_flags.roll, b.explore_flags.roll);
    }
}

#[tokio::test]
async fn test_request_id_replays_the_first_decision() {
    let store = Arc::new(InMemoryStore::new());
    let state = seeded(store.clone(), 3);
    let mut request = rank_request("style", true);
    request.options.request_id = Some("req-1".to_string());

    let first = state.engine.rank(request.clone()).await.unwrap();
    let second = state.engine.rank(request.clone()).await.unwrap();
    assert_eq!(first.decision_id, second.decision_id);
    assert_eq!(first.candidate_set_id, second.candidate_set_id);
    assert_eq!(first.chosen.id, second.chosen.id);
    assert_eq!(first.mode, second.mode);

    // replay survives a cold decision cache by reading the store
    state.engine.clear_caches(false, true).await;
    let third = state.engine.rank(request).await.unwrap();
    assert_eq!(first.decision_id, third.decision_id);
    assert_eq!(first.chosen.id, third.chosen.id);
    assert_eq!(store.decision_count(), 1);
}

#[tokio::test]
async fn test_open_breaker_forces_fallback() {
    let state = seeded(Arc::new(InMemoryStore::new()), 5);
    for _ in 0..Config::default().breaker.failure_threshold {
        state.breakers.record_failure("anthropic");
    }

    let response = state.engine.rank(rank_request("model", true)).await.unwrap();
    assert!(response.fallback_used);
    assert_eq!(response.chosen.id, "fallback-model");
    assert_eq!(response.mode, DecisionMode::Exploit);
    assert!(response.top_k.is_empty());

    let details = state.engine.decision_details(response.decision_id).await.unwrap();
    let removed: Vec<_> = details
        .decision
        .weights_snapshot
        .gate_report
        .iter()
        .map(|r| r.reason.kind())
        .collect();
    assert_eq!(removed, vec!["breaker_open", "breaker_open"]);

    assert!(state.breakers.clear_all() > 0);
    let response = state.engine.rank(rank_request("model", false)).await.unwrap();
    assert!(!response.fallback_used);
    assert_eq!(response.chosen.id, "sonnet");
}

#[tokio::test]
async fn test_fallback_behind_open_breaker_is_flagged() {
    let catalog: CatalogFile = serde_json::from_value(json!({
        "candidates": {"model": [model("gpt-4o", "openai", 0.9)]}
    }))
    .unwrap();
    let state = seeded_with(Arc::new(InMemoryStore::new()), 17, catalog);
    for _ in 0..Config::default().breaker.failure_threshold {
        state.breakers.record_failure("openai");
    }

    let response = state.engine.rank(rank_request("model", true)).await.unwrap();
    assert!(response.fallback_used);
    assert!(response.fallback_unhealthy);
    assert_eq!(response.chosen.id, "fallback-model");

    let details = state.engine.decision_details(response.decision_id).await.unwrap();
    let report = &details.decision.weights_snapshot.gate_report;
    let flagged: Vec<_> = report.iter().map(|r| r.target_id.as_str()).collect();
    assert_eq!(flagged, vec!["gpt-4o", "fallback-model"]);
    assert!(report
        .iter()
        .all(|r| matches!(&r.reason, RemovalReason::BreakerOpen { key } if key == "openai")));

    let auto_select = details
        .events
        .iter()
        .find(|e| e.event_type == EventType::AutoSelect)
        .unwrap();
    assert_eq!(auto_select.payload["fallbackUnhealthy"], true);
}

#[tokio::test]
async fn test_fallback_is_listed_once_when_the_pool_shares_its_id() {
    let catalog: CatalogFile = serde_json::from_value(json!({
        "candidates": {
            "model": [model("sonnet", "anthropic", 0.9), model("fallback-model", "openai", 0.5)]
        }
    }))
    .unwrap();
    let state = seeded_with(Arc::new(InMemoryStore::new()), 19, catalog);
    tune(&state, "model", json!({"kFine": 1})).await;
    for _ in 0..Config::default().breaker.failure_threshold {
        state.breakers.record_failure("anthropic");
    }

    let response = state.engine.rank(rank_request("model", true)).await.unwrap();
    assert!(response.fallback_used);
    assert!(!response.fallback_unhealthy);
    assert_eq!(response.chosen.id, "fallback-model");
    assert_eq!(response.chosen.bucket, Bucket::OutOfPool);
    assert!(response.alternatives.coarse_extras.is_empty());

    let details = state.engine.decision_details(response.decision_id).await.unwrap();
    let copies = details
        .candidate_set
        .candidates
        .iter()
        .filter(|c| c.target_id == "fallback-model")
        .count();
    assert_eq!(copies, 1);
}

#[tokio::test]
async fn test_cached_pool_scores_are_stable() {
    let state = seeded(Arc::new(InMemoryStore::new()), 23);

    let first = state.engine.rank(rank_request("style", false)).await.unwrap();
    let second = state.engine.rank(rank_request("style", false)).await.unwrap();

    let first_snapshot = state.engine.decision_details(first.decision_id).await.unwrap();
    let second_snapshot = state.engine.decision_details(second.decision_id).await.unwrap();
    let (a, b) = (
        &first_snapshot.decision.weights_snapshot,
        &second_snapshot.decision.weights_snapshot,
    );
    assert_eq!(a.pool_fingerprint, b.pool_fingerprint);
    assert!(!a.pool_cache_hit);
    assert!(b.pool_cache_hit);

    assert!(!first.top_k.is_empty());
    for view in &first.top_k {
        let other = second
            .top_k
            .iter()
            .find(|c| c.id == view.id)
            .unwrap_or_else(|| panic!("{} missing from second ranking", view.id));
        assert_eq!(view.coarse_score, other.coarse_score);
        assert_eq!(view.fine_score, other.fine_score);
    }
}

#[tokio::test]
async fn test_diversity_demotes_the_previous_category() {
    let catalog: CatalogFile = serde_json::from_value(json!({
        "candidates": {
            "style": [styled("A", "neon", 0.9), styled("B", "pastel", 0.85), styled("C", "mono", 0.3)]
        }
    }))
    .unwrap();
    let state = seeded_with(Arc::new(InMemoryStore::new()), 29, catalog);
    tune(&state, "style", json!({"diversity": true})).await;

    let first = state.engine.rank(rank_request("style", false)).await.unwrap();
    assert_eq!(first.chosen.id, "A");
    assert!(!first.explore_flags.diversity_applied);

    let second = state.engine.rank(rank_request("style", false)).await.unwrap();
    assert_eq!(second.chosen.id, "B");
    assert!(second.explore_flags.diversity_applied);
    let demoted = second.top_k.iter().find(|c| c.id == "A").unwrap();
    assert!(demoted.final_score < second.chosen.final_score);

    // history is per subject
    let other = state
        .engine
        .rank(rank_for("style", "job-7", false))
        .await
        .unwrap();
    assert_eq!(other.chosen.id, "A");
    assert!(!other.explore_flags.diversity_applied);
}

#[tokio::test]
async fn test_decision_events_and_single_outcome_row() {
    let store = Arc::new(InMemoryStore::new());
    let state = seeded(store.clone(), 11);
    let response = state.engine.rank(rank_request("style", false)).await.unwrap();

    let first: FeedbackRequest = serde_json::from_value(json!({
        "decisionId": response.decision_id,
        "latencyMs": 1200,
        "costActual": 0.004
    }))
    .unwrap();
    let second: FeedbackRequest = serde_json::from_value(json!({
        "decisionId": response.decision_id,
        "qualityScore": 0.8,
        "conversion": true
    }))
    .unwrap();
    state.feedback.ingest(first).await.unwrap();
    let merged = state.feedback.ingest(second).await.unwrap().outcome.unwrap();

    assert_eq!(store.outcome_count(), 1);
    assert_eq!(merged.latency_ms, Some(1200));
    assert_eq!(merged.quality_score, Some(0.8));
    assert_eq!(merged.conversion, Some(true));

    let details = state.engine.decision_details(response.decision_id).await.unwrap();
    let kinds: Vec<_> = details.events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![EventType::Expose, EventType::AutoSelect]);
    assert_eq!(details.outcome, Some(merged));
}

#[tokio::test]
async fn test_edit_distance_overrides_positive_counts() {
    let state = seeded(Arc::new(InMemoryStore::new()), 13);
    let response = state.engine.rank(rank_request("style", false)).await.unwrap();

    let request: FeedbackRequest = serde_json::from_value(json!({
        "decisionId": response.decision_id,
        "editDistance": 0.35,
        "payload": {"addedSellingPoints": 5, "addedPainPoints": 0, "rerunCount": 0}
    }))
    .unwrap();
    let feedback = state.feedback.ingest(request).await.unwrap();

    assert_eq!(feedback.events, vec![EventType::ImplicitNegative]);
    assert!(feedback.feedback_id.is_none());
}

/// Decision store that fails its first `failures` writes, then delegates
struct FlakyStore {
    inner: InMemoryStore,
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl DecisionStore for FlakyStore {
    async fn record_decision(
        &self,
        set: &CandidateSet,
        decision: &Decision,
    ) -> StoreResult<RecordOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.record_decision(set, decision).await
    }

    async fn get_decision(&self, id: Uuid) -> StoreResult<Option<Decision>> {
        self.inner.get_decision(id).await
    }

    async fn get_candidate_set(&self, id: Uuid) -> StoreResult<Option<CandidateSet>> {
        self.inner.get_candidate_set(id).await
    }

    async fn upsert_outcome(&self, decision_id: Uuid, patch: &OutcomePatch) -> StoreResult<Outcome> {
        self.inner.upsert_outcome(decision_id, patch).await
    }

    async fn get_outcome(&self, decision_id: Uuid) -> StoreResult<Option<Outcome>> {
        self.inner.get_outcome(decision_id).await
    }

    async fn append_event(&self, event: &Event) -> StoreResult<()> {
        self.inner.append_event(event).await
    }

    async fn list_events(&self, decision_id: Uuid) -> StoreResult<Vec<Event>> {
        self.inner.list_events(decision_id).await
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.inner.insert_feedback(feedback).await
    }

    async fn decision_stats(&self, since: DateTime<Utc>) -> StoreResult<DecisionStats> {
        self.inner.decision_stats(since).await
    }
}

fn with_decision_store(store: Arc<FlakyStore>) -> AppState {
    let config = Config::default();
    let cache = Arc::new(InMemoryTtlCache::new());
    let wiring = Wiring::with_backends(
        &config,
        catalog(),
        store,
        Arc::new(InMemoryStore::new()),
        cache.clone(),
        cache,
    );
    build_state(&config, wiring)
}

#[tokio::test]
async fn test_transient_write_failures_are_retried() {
    let store = Arc::new(FlakyStore::new(2));
    let state = with_decision_store(store.clone());

    let response = state.engine.rank(rank_request("style", false)).await.unwrap();

    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert!(store.inner.get_decision(response.decision_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unrecordable_decision_is_not_returned() {
    let store = Arc::new(FlakyStore::new(usize::MAX));
    let state = with_decision_store(store.clone());

    let result = state.engine.rank(rank_request("style", false)).await;

    assert!(matches!(result, Err(AppError::Persistence(_))));
    let retries = Config::default().database.record_retries as usize;
    assert_eq!(store.attempts.load(Ordering::SeqCst), retries + 1);
    assert_eq!(store.inner.decision_count(), 0);
    assert_eq!(state.engine.metrics().snapshot(Utc::now()).total, 0);
}
