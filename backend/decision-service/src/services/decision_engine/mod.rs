// ============================================
// Decision Engine
// ============================================
//
// Pipeline: Pool → Coarse → Fine → Gate → Exploration → Recorder
//
// 1. Replay: a known requestId returns the cached or stored response
// 2. Pool: fingerprinted candidate lookup (never fails, may be empty)
// 3. Coarse: prune to `mCoarse`, keep a few extras below the cut
// 4. Fine: keep the top `kFine`
// 5. Gate: remove / penalise, or fall back to the out-of-pool candidate
// 6. Exploration: exploit rank 1 or explore an alternative
// 7. Record set + decision durably, then expose / auto_select events

mod snapshot;

pub use snapshot::DecisionDetails;

use crate::cache::{CacheKey, TtlCache};
use crate::error::{AppError, Result};
use crate::models::{
    CandidateSet, Decision, DecisionMode, DecisionStats, ExploreFlags, RankRequest, RankResponse,
    Scenario, ScoredCandidate, TaskSpec,
};
use crate::services::candidate_pool::{CandidatePool, CandidatePoolCache, CatalogWeights};
use crate::services::coarse_ranking::CoarseRankingLayer;
use crate::services::constraint_gate::{ConstraintGate, GateInput};
use crate::services::decision_recorder::{decision_id, DecisionRecorder};
use crate::services::exploration::{
    effective_rate, Choice, DiversityPenalty, ExplorationInput, ExplorationPolicy, RecentChoiceLog,
    Selection,
};
use crate::services::fine_ranking::FineRankingLayer;
use crate::services::metrics::{DecisionMetrics, MetricsAggregator};
use crate::services::settings::SettingsService;
use crate::store::{DecisionStore, RecordOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use serde::Serialize;
use snapshot::{Assembly, Picked};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the engine needs, assembled once at startup
pub struct EngineParts {
    pub pool: CandidatePoolCache,
    pub weights: CatalogWeights,
    pub coarse: CoarseRankingLayer,
    pub fine: FineRankingLayer,
    pub gate: ConstraintGate,
    pub exploration: ExplorationPolicy,
    pub diversity: DiversityPenalty,
    pub recent: RecentChoiceLog,
    pub settings: SettingsService,
    pub recorder: DecisionRecorder,
    pub store: Arc<dyn DecisionStore>,
    pub decision_cache: Arc<dyn TtlCache>,
    pub decision_ttl: Duration,
    pub metrics: MetricsAggregator,
    /// Seeded generator for reproducible runs; thread-local RNG otherwise
    pub rng: Option<StdRng>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub pool_entries: usize,
    pub decision_entries: usize,
    pub recent_subjects: usize,
}

pub struct DecisionEngine {
    pool: CandidatePoolCache,
    weights: CatalogWeights,
    coarse: CoarseRankingLayer,
    fine: FineRankingLayer,
    gate: ConstraintGate,
    exploration: ExplorationPolicy,
    diversity: DiversityPenalty,
    recent: RecentChoiceLog,
    settings: SettingsService,
    recorder: DecisionRecorder,
    store: Arc<dyn DecisionStore>,
    decision_cache: Arc<dyn TtlCache>,
    decision_ttl: Duration,
    metrics: MetricsAggregator,
    rng: Option<Mutex<StdRng>>,
}

impl DecisionEngine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            pool: parts.pool,
            weights: parts.weights,
            coarse: parts.coarse,
            fine: parts.fine,
            gate: parts.gate,
            exploration: parts.exploration,
            diversity: parts.diversity,
            recent: parts.recent,
            settings: parts.settings,
            recorder: parts.recorder,
            store: parts.store,
            decision_cache: parts.decision_cache,
            decision_ttl: parts.decision_ttl,
            metrics: parts.metrics,
            rng: parts.rng.map(Mutex::new),
        }
    }

    pub async fn rank(&self, request: RankRequest) -> Result<RankResponse> {
        let started = Instant::now();
        let scenario: Scenario = request.scenario.parse().map_err(AppError::BadRequest)?;
        let task = Self::validate_request(&request)?;
        let request_id = request.options.request_id.as_deref();
        let id = decision_id(scenario, request_id);

        if let Some(request_id) = request_id {
            if let Some(response) = self.replay(scenario, request_id, id).await? {
                return Ok(response);
            }
        }

        let setting = self.settings.get(scenario).await?;
        let CandidatePool {
            fingerprint,
            candidates,
            fetched_at,
            cache_hit,
        } = self
            .pool
            .get_or_fetch(scenario, Some(task), &request.context)
            .await;

        let coarse_weights = self
            .weights
            .coarse
            .resolve(Some(task))
            .map_err(|e| AppError::Internal(format!("coarse weights: {}", e)))?;
        let fine_weights = self
            .weights
            .fine
            .resolve(Some(task))
            .map_err(|e| AppError::Internal(format!("fine weights: {}", e)))?;

        let coarse = self
            .coarse
            .rank(candidates, &coarse_weights.weights, setting.m_coarse, fetched_at)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let fine = self.fine.rank(coarse.survivors, &fine_weights.weights, setting.k_fine);

        let input = GateInput {
            setting: &setting,
            constraints: &request.constraints,
            context: &request.context,
        };
        let gated = self.gate.apply(scenario, Some(task), fine.top_k, &input);

        // fine-dropped survivors rank ahead of the coarse remainder
        let mut extras: Vec<ScoredCandidate> = fine
            .dropped
            .into_iter()
            .chain(coarse.extras)
            .filter(|c| self.gate.admits(&c.raw, &input).is_ok())
            .take(self.coarse.extras_limit())
            .collect();

        let now = Utc::now();
        let rate = effective_rate(setting.epsilon, setting.min_explore);
        let fallback_used = gated.fallback.is_some();
        let fallback_unhealthy = gated.fallback_unhealthy;
        let mut ranked = gated.survivors;

        let picked = match gated.fallback {
            Some(fallback) => {
                // the fallback is listed once, as out_of_pool
                extras.retain(|c| c.id() != fallback.id());
                Picked {
                    chosen: fallback.clone(),
                    out_of_pool: Some(fallback),
                    mode: DecisionMode::Exploit,
                    flags: ExploreFlags {
                        effective_rate: rate,
                        disabled_by_request: !request.options.explore,
                        ..Default::default()
                    },
                }
            }
            None => {
                let out_of_pool = self
                    .gate
                    .out_of_pool(scenario, Some(task), &input)
                    .filter(|oop| {
                        !ranked.iter().chain(extras.iter()).any(|c| c.id() == oop.id())
                    });

                let mut diversity_applied = false;
                if setting.diversity {
                    let recent = self.recent.recent(&task.subject_ref, now);
                    diversity_applied = self.diversity.apply(&mut ranked, &recent);
                    diversity_applied |= self.diversity.apply(&mut extras, &recent);
                }

                let selection = self
                    .select(&ExplorationInput {
                        ranked: &ranked,
                        coarse_extras: &extras,
                        out_of_pool: out_of_pool.as_ref(),
                        epsilon: setting.epsilon,
                        min_explore: setting.min_explore,
                        enabled: request.options.explore,
                    })
                    .ok_or_else(|| {
                        AppError::NoViableCandidate(format!("no candidate for {}", scenario))
                    })?;

                let chosen = match selection.choice {
                    Choice::Ranked(i) => ranked.get(i),
                    Choice::CoarseExtra(i) => extras.get(i),
                    Choice::OutOfPool => out_of_pool.as_ref(),
                }
                .cloned()
                .ok_or_else(|| AppError::Internal("selection out of range".to_string()))?;

                let mut flags = selection.flags;
                flags.diversity_applied = diversity_applied;
                Picked {
                    chosen,
                    out_of_pool,
                    mode: selection.mode,
                    flags,
                }
            }
        };

        let assembly = Assembly {
            id,
            scenario,
            request: &request,
            task,
            setting: &setting,
            pool_fingerprint: fingerprint,
            pool_cache_hit: cache_hit,
            coarse_weights: &coarse_weights,
            fine_weights: &fine_weights,
            ranked: &ranked,
            extras: &extras,
            removed: gated.removed,
            fallback_used,
            fallback_unhealthy,
            now,
        };
        let (set, decision) = assembly.build(&picked);

        let (set, decision) = match self.recorder.record(&set, &decision).await? {
            RecordOutcome::Inserted => {
                self.after_insert(&set, &decision, &picked.chosen, &task.subject_ref)
                    .await;
                (set, decision)
            }
            RecordOutcome::AlreadyRecorded(existing) => {
                let stored = self
                    .store
                    .get_candidate_set(existing.candidate_set_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Persistence(format!(
                            "candidate set missing for decision {}",
                            existing.id
                        ))
                    })?;
                (stored, *existing)
            }
        };

        let response = RankResponse::from_records(&set, &decision)
            .ok_or_else(|| AppError::Internal("chosen candidate missing from set".to_string()))?;

        if let Some(request_id) = request_id {
            self.cache_response(scenario, request_id, &response).await;
        }

        DecisionMetrics::observe_pipeline(scenario.as_str(), started.elapsed().as_secs_f64());
        info!(
            decision_id = %response.decision_id,
            %scenario,
            chosen = %response.chosen.id,
            mode = response.mode.as_str(),
            fallback_used = response.fallback_used,
            fallback_unhealthy = response.fallback_unhealthy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rank request completed"
        );
        Ok(response)
    }

    pub async fn decision_details(&self, id: Uuid) -> Result<DecisionDetails> {
        let decision = self
            .store
            .get_decision(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("decision {}", id)))?;
        let candidate_set = self
            .store
            .get_candidate_set(decision.candidate_set_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("candidate set {}", decision.candidate_set_id)))?;
        let outcome = self.store.get_outcome(id).await?;
        let events = self.store.list_events(id).await?;

        Ok(DecisionDetails {
            decision,
            candidate_set,
            outcome,
            events,
        })
    }

    pub async fn decision_stats(&self, since: DateTime<Utc>) -> Result<DecisionStats> {
        Ok(self.store.decision_stats(since).await?)
    }

    pub async fn clear_caches(&self, pool: bool, decisions: bool) -> ClearReport {
        let mut report = ClearReport::default();
        if pool {
            report.pool_entries = self.pool.clear().await;
        }
        if decisions {
            report.decision_entries = match self.decision_cache.clear(&CacheKey::decision_prefix()).await {
                Ok(removed) => removed,
                Err(e) => {
                    warn!(error = %e, "Decision cache clear failed");
                    0
                }
            };
            report.recent_subjects = self.recent.clear();
        }
        info!(
            pool_entries = report.pool_entries,
            decision_entries = report.decision_entries,
            recent_subjects = report.recent_subjects,
            "Caches cleared"
        );
        report
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    fn validate_request(request: &RankRequest) -> Result<&TaskSpec> {
        let task = request
            .task
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("task is required".to_string()))?;
        if task.subject_ref.trim().is_empty() {
            return Err(AppError::BadRequest("task.subjectRef must not be empty".to_string()));
        }
        if request.options.top_k == Some(0) {
            return Err(AppError::Validation("options.topK must be at least 1".to_string()));
        }
        if request.constraints.max_cost_usd.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err(AppError::Validation("constraints.maxCostUSD must be non-negative".to_string()));
        }
        Ok(task)
    }

    /// Response for a request id seen before: decision cache first, then the store
    async fn replay(&self, scenario: Scenario, request_id: &str, id: Uuid) -> Result<Option<RankResponse>> {
        let key = CacheKey::decision(scenario, request_id);
        match self.decision_cache.get(&key).await {
            Ok(Some(data)) => match serde_json::from_str::<RankResponse>(&data) {
                Ok(response) => {
                    debug!(key = %key, "Decision cache hit");
                    return Ok(Some(response));
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cached decision"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Decision cache read failed, treating as miss"),
        }

        let Some(decision) = self.store.get_decision(id).await? else {
            return Ok(None);
        };
        let Some(set) = self.store.get_candidate_set(decision.candidate_set_id).await? else {
            return Ok(None);
        };
        debug!(decision_id = %id, "Replaying stored decision");
        let response = RankResponse::from_records(&set, &decision);
        if let Some(response) = &response {
            self.cache_response(scenario, request_id, response).await;
        }
        Ok(response)
    }

    async fn cache_response(&self, scenario: Scenario, request_id: &str, response: &RankResponse) {
        let key = CacheKey::decision(scenario, request_id);
        match serde_json::to_string(response) {
            Ok(data) => {
                if let Err(e) = self.decision_cache.set(&key, data, self.decision_ttl).await {
                    warn!(key = %key, error = %e, "Decision cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Decision serialization failed"),
        }
    }

    fn select(&self, input: &ExplorationInput<'_>) -> Option<Selection> {
        match &self.rng {
            Some(rng) => self.exploration.select(input, &mut *rng.lock()),
            None => self.exploration.select(input, &mut rand::thread_rng()),
        }
    }

    /// Bookkeeping once the decision is durable. Failures here are logged,
    /// the decision itself already stands.
    async fn after_insert(
        &self,
        set: &CandidateSet,
        decision: &Decision,
        chosen: &ScoredCandidate,
        subject_ref: &str,
    ) {
        for event in snapshot::decision_events(set, decision) {
            if let Err(e) = self.store.append_event(&event).await {
                warn!(
                    decision_id = %decision.id,
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "Failed to append decision event"
                );
            }
        }

        self.recent.record(subject_ref, chosen, decision.created_at);
        self.metrics.record_decision(decision);
        DecisionMetrics::record_decision(
            decision.scenario.as_str(),
            decision.mode.as_str(),
            decision.fallback_used(),
        );
    }
}
