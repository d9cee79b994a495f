use super::{
    Bucket, Candidate, CandidateReason, CandidateSet, Decision, DecisionMode, EventType,
    ExploreFlags, Outcome, OutcomePatch, Scenario,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    pub scenario: String,
    pub task: Option<TaskSpec>,
    #[serde(default)]
    pub context: ContextSpec,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub options: RankOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub subject_ref: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Economy,
    Standard,
    Premium,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetTier::Economy => "economy",
            BudgetTier::Standard => "standard",
            BudgetTier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextSpec {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub budget_tier: Option<BudgetTier>,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, rename = "maxCostUSD", alias = "maxCostUsd")]
    pub max_cost_usd: Option<f64>,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub allow_providers: Option<Vec<String>>,
    #[serde(default)]
    pub deny_providers: Vec<String>,
    #[serde(default)]
    pub require_json_mode: bool,
    #[serde(default)]
    pub require_tool_use: bool,
    #[serde(default)]
    pub min_safety_level: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankOptions {
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "explore_on")]
    pub explore: bool,
    #[serde(default)]
    pub strategy_version: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

fn explore_on() -> bool {
    true
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            explore: true,
            strategy_version: None,
            request_id: None,
        }
    }
}

/// Candidate as presented to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
    pub id: String,
    pub target_type: Scenario,
    pub coarse_score: f64,
    pub fine_score: Option<f64>,
    pub final_score: f64,
    pub bucket: Bucket,
    pub reason: CandidateReason,
}

impl From<&Candidate> for CandidateView {
    fn from(c: &Candidate) -> Self {
        Self {
            id: c.target_id.clone(),
            target_type: c.target_type,
            coarse_score: c.coarse_score,
            fine_score: c.fine_score,
            final_score: c.final_score,
            bucket: c.bucket,
            reason: c.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alternatives {
    pub fine_top2: Option<CandidateView>,
    pub coarse_extras: Vec<CandidateView>,
    pub out_of_pool: Vec<CandidateView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankResponse {
    pub decision_id: Uuid,
    pub candidate_set_id: Uuid,
    pub scenario: Scenario,
    pub chosen: CandidateView,
    pub mode: DecisionMode,
    pub fallback_used: bool,
    #[serde(default)]
    pub fallback_unhealthy: bool,
    pub alternatives: Alternatives,
    pub top_k: Vec<CandidateView>,
    pub explore_flags: ExploreFlags,
}

impl RankResponse {
    /// Rebuild the response from what was persisted. Returns `None` if the
    /// chosen id is missing from the set, which would mean a corrupt record.
    pub fn from_records(set: &CandidateSet, decision: &Decision) -> Option<Self> {
        let chosen = set.find(&decision.chosen_target_id)?;
        let limit = decision.weights_snapshot.top_k;

        let top_k = set
            .candidates
            .iter()
            .filter(|c| matches!(c.bucket, Bucket::Top1 | Bucket::FineTop2 | Bucket::FineTopK))
            .take(limit)
            .map(CandidateView::from)
            .collect();

        Some(Self {
            decision_id: decision.id,
            candidate_set_id: set.id,
            scenario: decision.scenario,
            chosen: CandidateView::from(chosen),
            mode: decision.mode,
            fallback_used: decision.fallback_used(),
            fallback_unhealthy: decision.fallback_unhealthy(),
            alternatives: Alternatives {
                fine_top2: set.in_bucket(Bucket::FineTop2).next().map(CandidateView::from),
                coarse_extras: set.in_bucket(Bucket::CoarseExtra).map(CandidateView::from).collect(),
                out_of_pool: set.in_bucket(Bucket::OutOfPool).map(CandidateView::from).collect(),
            },
            top_k,
            explore_flags: decision.explore_flags.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub decision_id: Uuid,
    #[serde(default)]
    pub user_choice: Option<String>,
    #[serde(default, rename = "type")]
    pub feedback_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub cost_actual: Option<f64>,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub conversion: Option<bool>,
    #[serde(default)]
    pub rejected: Option<bool>,
    #[serde(default)]
    pub edit_distance: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FeedbackRequest {
    pub fn outcome_patch(&self) -> OutcomePatch {
        OutcomePatch {
            latency_ms: self.latency_ms,
            cost_actual: self.cost_actual,
            quality_score: self.quality_score,
            conversion: self.conversion,
            rejected: self.rejected,
            edit_distance: self.edit_distance,
            notes: self.notes.clone(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.user_choice.is_some() || self.feedback_type.is_some() || self.reason.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub decision_id: Uuid,
    pub feedback_id: Option<Uuid>,
    pub outcome: Option<Outcome>,
    pub events: Vec<EventType>,
}
