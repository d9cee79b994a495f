use super::{Bucket, Candidate, Scenario, SettingMode};
use crate::services::weights::{CoarseWeights, FineWeights};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frozen view of what was ranked and shown. Never edited after persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSet {
    pub id: Uuid,
    pub scenario: Scenario,
    pub subject_snapshot: serde_json::Value,
    pub context_snapshot: serde_json::Value,
    pub candidates: Vec<Candidate>,
    pub created_at: DateTime<Utc>,
}

impl CandidateSet {
    pub fn contains(&self, target_id: &str) -> bool {
        self.candidates.iter().any(|c| c.target_id == target_id)
    }

    pub fn find(&self, target_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.target_id == target_id)
    }

    pub fn in_bucket(&self, bucket: Bucket) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.bucket == bucket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Exploit,
    Explore,
}

impl DecisionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionMode::Exploit => "exploit",
            DecisionMode::Explore => "explore",
        }
    }
}

/// Why the gate removed a candidate outright
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovalReason {
    JsonModeUnsupported,
    ToolUseUnsupported,
    ProviderDenied { provider: String },
    ProviderNotAllowed { provider: Option<String> },
    SafetyBelowMinimum { level: u8, minimum: u8 },
    BreakerOpen { key: String },
    LatencyOverLimit { estimated_ms: u64, limit_ms: u64 },
    CostOverCeiling { estimated_usd: f64, ceiling_usd: f64 },
    QualityBelowFloor { quality: f64, floor: f64 },
}

impl RemovalReason {
    pub fn kind(&self) -> &'static str {
        match self {
            RemovalReason::JsonModeUnsupported => "json_mode_unsupported",
            RemovalReason::ToolUseUnsupported => "tool_use_unsupported",
            RemovalReason::ProviderDenied { .. } => "provider_denied",
            RemovalReason::ProviderNotAllowed { .. } => "provider_not_allowed",
            RemovalReason::SafetyBelowMinimum { .. } => "safety_below_minimum",
            RemovalReason::BreakerOpen { .. } => "breaker_open",
            RemovalReason::LatencyOverLimit { .. } => "latency_over_limit",
            RemovalReason::CostOverCeiling { .. } => "cost_over_ceiling",
            RemovalReason::QualityBelowFloor { .. } => "quality_below_floor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateRemoval {
    pub target_id: String,
    pub reason: RemovalReason,
}

/// Scoring weights and flags in force when the decision was made
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightsSnapshot {
    pub coarse: CoarseWeights,
    pub fine: FineWeights,
    pub weight_levels: Vec<String>,
    pub m_coarse: usize,
    pub k_fine: usize,
    /// Length of the `topK` list returned to the caller
    pub top_k: usize,
    pub epsilon: f64,
    pub min_explore: f64,
    pub diversity: bool,
    pub requested_mode: SettingMode,
    pub strategy: String,
    pub strategy_version: Option<String>,
    pub fallback_used: bool,
    /// The fallback was chosen while its breaker was open
    #[serde(default)]
    pub fallback_unhealthy: bool,
    #[serde(default)]
    pub gate_report: Vec<GateRemoval>,
    pub pool_fingerprint: String,
    pub pool_cache_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploreSource {
    FineTop2,
    CoarseExtra,
    OutOfPool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExploreFlags {
    pub effective_rate: f64,
    /// Uniform draw compared against `effective_rate`; absent when exploration was off
    pub roll: Option<f64>,
    pub disabled_by_request: bool,
    pub source: Option<ExploreSource>,
    pub alternatives_available: usize,
    pub diversity_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: Uuid,
    pub candidate_set_id: Uuid,
    pub scenario: Scenario,
    pub subject_ref: String,
    pub chosen_target_id: String,
    pub mode: DecisionMode,
    pub weights_snapshot: WeightsSnapshot,
    pub explore_flags: ExploreFlags,
    pub request_id: Option<String>,
    pub segment: String,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn fallback_used(&self) -> bool {
        self.weights_snapshot.fallback_used
    }

    pub fn fallback_unhealthy(&self) -> bool {
        self.weights_snapshot.fallback_unhealthy
    }
}

/// Aggregate counts over recent decisions, computed by the store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionStats {
    pub since: Option<DateTime<Utc>>,
    pub total: u64,
    pub explore_count: u64,
    pub fallback_count: u64,
    pub explore_rate: f64,
    pub fallback_rate: f64,
}

impl DecisionStats {
    pub fn from_counts(since: DateTime<Utc>, total: u64, explore: u64, fallback: u64) -> Self {
        let rate = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        Self {
            since: Some(since),
            total,
            explore_count: explore,
            fallback_count: fallback,
            explore_rate: rate(explore),
            fallback_rate: rate(fallback),
        }
    }
}
