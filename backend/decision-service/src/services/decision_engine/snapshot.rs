use crate::models::{
    Bucket, Candidate, CandidateSet, Constraints, ContextSpec, Decision, DecisionMode, Event,
    EventType, ExploreFlags, GateRemoval, Outcome, RankOptions, RankRequest,
    RecommendationSetting, Scenario, ScoredCandidate, TaskSpec, WeightsSnapshot,
};
use crate::services::decision_recorder::candidate_set_id;
use crate::services::metrics::render_segment;
use crate::services::weights::{CoarseWeights, FineWeights, ResolvedWeights};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Scorer actually applied; an `ml` setting is recorded as requested but
/// still scored by the rule pipeline
const RULE_STRATEGY: &str = "rule";

/// Decision with everything attached to it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDetails {
    pub decision: Decision,
    pub candidate_set: CandidateSet,
    pub outcome: Option<Outcome>,
    pub events: Vec<Event>,
}

/// What the selection step settled on
pub(super) struct Picked {
    pub chosen: ScoredCandidate,
    pub out_of_pool: Option<ScoredCandidate>,
    pub mode: DecisionMode,
    pub flags: ExploreFlags,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextSnapshot<'a> {
    context: &'a ContextSpec,
    constraints: &'a Constraints,
    options: &'a RankOptions,
}

/// Inputs for freezing one request into a candidate set and decision
pub(super) struct Assembly<'a> {
    pub id: Uuid,
    pub scenario: Scenario,
    pub request: &'a RankRequest,
    pub task: &'a TaskSpec,
    pub setting: &'a RecommendationSetting,
    pub pool_fingerprint: String,
    pub pool_cache_hit: bool,
    pub coarse_weights: &'a ResolvedWeights<CoarseWeights>,
    pub fine_weights: &'a ResolvedWeights<FineWeights>,
    pub ranked: &'a [ScoredCandidate],
    pub extras: &'a [ScoredCandidate],
    pub removed: Vec<GateRemoval>,
    pub fallback_used: bool,
    pub fallback_unhealthy: bool,
    pub now: DateTime<Utc>,
}

impl Assembly<'_> {
    pub fn build(self, picked: &Picked) -> (CandidateSet, Decision) {
        let set = CandidateSet {
            id: candidate_set_id(self.id),
            scenario: self.scenario,
            subject_snapshot: serde_json::to_value(self.task).unwrap_or_default(),
            context_snapshot: serde_json::to_value(ContextSnapshot {
                context: &self.request.context,
                constraints: &self.request.constraints,
                options: &self.request.options,
            })
            .unwrap_or_default(),
            candidates: self.candidates(picked.out_of_pool.as_ref()),
            created_at: self.now,
        };

        let mut weight_levels = self.coarse_weights.levels.clone();
        for level in &self.fine_weights.levels {
            if !weight_levels.contains(level) {
                weight_levels.push(level.clone());
            }
        }

        let options = &self.request.options;
        let decision = Decision {
            id: self.id,
            candidate_set_id: set.id,
            scenario: self.scenario,
            subject_ref: self.task.subject_ref.clone(),
            chosen_target_id: picked.chosen.raw.id.clone(),
            mode: picked.mode,
            weights_snapshot: WeightsSnapshot {
                coarse: self.coarse_weights.weights.clone(),
                fine: self.fine_weights.weights.clone(),
                weight_levels,
                m_coarse: self.setting.m_coarse,
                k_fine: self.setting.k_fine,
                top_k: options.top_k.unwrap_or(self.setting.k_fine),
                epsilon: self.setting.epsilon,
                min_explore: self.setting.min_explore,
                diversity: self.setting.diversity,
                requested_mode: self.setting.mode,
                strategy: RULE_STRATEGY.to_string(),
                strategy_version: options.strategy_version.clone(),
                fallback_used: self.fallback_used,
                fallback_unhealthy: self.fallback_unhealthy,
                gate_report: self.removed,
                pool_fingerprint: self.pool_fingerprint,
                pool_cache_hit: self.pool_cache_hit,
            },
            explore_flags: picked.flags.clone(),
            request_id: options.request_id.clone(),
            segment: render_segment(
                &self.setting.segment_template,
                self.scenario,
                Some(self.task),
                &self.request.context,
            ),
            created_at: self.now,
        };

        (set, decision)
    }

    fn candidates(&self, out_of_pool: Option<&ScoredCandidate>) -> Vec<Candidate> {
        let ranked = self.ranked.iter().enumerate().map(|(rank, c)| {
            let bucket = match rank {
                0 => Bucket::Top1,
                1 => Bucket::FineTop2,
                _ => Bucket::FineTopK,
            };
            c.to_candidate(bucket)
        });
        let extras = self.extras.iter().map(|c| c.to_candidate(Bucket::CoarseExtra));
        let oop = out_of_pool.map(|c| c.to_candidate(Bucket::OutOfPool));

        ranked.chain(extras).chain(oop).collect()
    }
}

/// `expose` (everything shown) and `auto_select` (what was chosen)
pub(super) fn decision_events(set: &CandidateSet, decision: &Decision) -> [Event; 2] {
    let shown: Vec<_> = set
        .candidates
        .iter()
        .map(|c| json!({"id": c.target_id, "bucket": c.bucket}))
        .collect();

    [
        Event::new(
            decision.id,
            EventType::Expose,
            json!({"candidateSetId": set.id, "candidates": shown}),
        ),
        Event::new(
            decision.id,
            EventType::AutoSelect,
            json!({
                "chosen": decision.chosen_target_id,
                "mode": decision.mode,
                "fallbackUsed": decision.fallback_used(),
                "fallbackUnhealthy": decision.fallback_unhealthy(),
            }),
        ),
    ]
}
