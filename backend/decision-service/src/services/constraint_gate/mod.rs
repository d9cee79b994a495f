// ============================================
// Constraint Gate
// ============================================
//
// Order of checks:
// 1. Capability filters (JSON mode, tool use, provider lists, safety) → remove
// 2. Circuit breaker open for provider or provider/model → remove
// 3. Soft latency / cost overrun → score × penalty, kept
// 4. Hard latency / cost ceilings → remove
// 5. Quality floor: below reject floor → remove, below strict floor → flag
//
// An empty survivor set is not an error: the per-scenario fallback
// provider supplies one out-of-pool candidate and the decision records
// `fallbackUsed = true`.

mod fallback;

pub use fallback::{FallbackCandidateProvider, FallbackRegistry, StaticFallback};

use crate::models::{
    by_score_then_id, BudgetTier, Constraints, ContextSpec, GateRemoval, PenaltyKind,
    RawCandidate, RecommendationSetting, RemovalReason, Scenario, ScoredCandidate, TaskSpec,
};
use crate::services::metrics::DecisionMetrics;
use resilience::CircuitBreakerRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-only view of dependency health consulted by the gate
pub trait ProviderHealth: Send + Sync {
    fn is_open(&self, key: &str) -> bool;
}

impl ProviderHealth for CircuitBreakerRegistry {
    fn is_open(&self, key: &str) -> bool {
        CircuitBreakerRegistry::is_open(self, key)
    }
}

/// Per-call budget in USD for each budget tier
#[derive(Debug, Clone, Copy)]
pub struct TierBudgets {
    pub economy: f64,
    pub standard: f64,
    pub premium: f64,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            economy: 0.002,
            standard: 0.01,
            premium: 0.05,
        }
    }
}

impl TierBudgets {
    /// Missing tier counts as standard
    pub fn for_tier(&self, tier: Option<BudgetTier>) -> f64 {
        match tier.unwrap_or(BudgetTier::Standard) {
            BudgetTier::Economy => self.economy,
            BudgetTier::Standard => self.standard,
            BudgetTier::Premium => self.premium,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    /// Multiplier applied once per soft violation
    pub soft_penalty: f64,
    pub budgets: TierBudgets,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            soft_penalty: 0.8,
            budgets: TierBudgets::default(),
        }
    }
}

/// Request-scoped inputs to the gate
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub setting: &'a RecommendationSetting,
    pub constraints: &'a Constraints,
    pub context: &'a ContextSpec,
}

impl GateInput<'_> {
    /// Tightest of the scenario hard limit and any caller-supplied ceiling
    pub fn latency_ceiling(&self) -> u64 {
        [self.constraints.max_latency_ms, self.context.max_latency_ms]
            .into_iter()
            .flatten()
            .fold(self.setting.latency_hard_ms, u64::min)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateResult {
    /// Best first after penalties
    pub survivors: Vec<ScoredCandidate>,
    pub removed: Vec<GateRemoval>,
    /// Present only when nothing survived
    pub fallback: Option<ScoredCandidate>,
    /// The fallback sits behind an open breaker; it is still returned and
    /// its breaker removal is listed in `removed`
    pub fallback_unhealthy: bool,
}

impl GateResult {
    pub fn fallback_used(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct ConstraintGate {
    policy: GatePolicy,
    health: Arc<dyn ProviderHealth>,
    fallbacks: Arc<FallbackRegistry>,
}

impl ConstraintGate {
    pub fn new(
        policy: GatePolicy,
        health: Arc<dyn ProviderHealth>,
        fallbacks: Arc<FallbackRegistry>,
    ) -> Self {
        Self {
            policy,
            health,
            fallbacks,
        }
    }

    pub fn apply(
        &self,
        scenario: Scenario,
        task: Option<&TaskSpec>,
        candidates: Vec<ScoredCandidate>,
        input: &GateInput<'_>,
    ) -> GateResult {
        let input_count = candidates.len();
        let mut survivors = Vec::with_capacity(input_count);
        let mut removed = Vec::new();

        for mut candidate in candidates {
            let verdict = self
                .check_capabilities(&candidate.raw, input.constraints)
                .and_then(|_| self.check_breakers(&candidate.raw))
                .and_then(|_| {
                    self.apply_soft_penalties(&mut candidate, input);
                    self.check_hard_limits(&candidate.raw, input)
                })
                .and_then(|_| Self::check_quality_floor(&mut candidate, input.setting));

            match verdict {
                Ok(()) => survivors.push(candidate),
                Err(reason) => {
                    debug!(candidate_id = %candidate.raw.id, reason = reason.kind(), "Candidate removed by gate");
                    DecisionMetrics::record_gate_removal(reason.kind());
                    removed.push(GateRemoval {
                        target_id: candidate.raw.id.clone(),
                        reason,
                    });
                }
            }
        }

        survivors.sort_by(|a, b| by_score_then_id(a.final_score, a.id(), b.final_score, b.id()));

        let mut fallback_unhealthy = false;
        let fallback = if survivors.is_empty() {
            let fallback = self
                .fallbacks
                .fallback(scenario, task)
                .map(ScoredCandidate::unscored);
            warn!(
                %scenario,
                input_count,
                removed = removed.len(),
                fallback_id = fallback.as_ref().map(|f| f.id()),
                "No candidate survived the gate, using fallback"
            );
            if let Some(candidate) = &fallback {
                if let Err(reason) = self.check_breakers(&candidate.raw) {
                    warn!(
                        %scenario,
                        fallback_id = candidate.id(),
                        reason = reason.kind(),
                        "Fallback candidate is behind an open breaker"
                    );
                    fallback_unhealthy = true;
                    removed.push(GateRemoval {
                        target_id: candidate.raw.id.clone(),
                        reason,
                    });
                }
            }
            fallback
        } else {
            None
        };

        GateResult {
            survivors,
            removed,
            fallback,
            fallback_unhealthy,
        }
    }

    /// Removal checks only (no penalties); used to vet exploration candidates
    pub fn admits(&self, candidate: &RawCandidate, input: &GateInput<'_>) -> Result<(), RemovalReason> {
        self.check_capabilities(candidate, input.constraints)?;
        self.check_breakers(candidate)?;
        self.check_hard_limits(candidate, input)?;
        let quality = candidate.signals.quality;
        if quality < input.setting.quality_floor_rej {
            return Err(RemovalReason::QualityBelowFloor {
                quality,
                floor: input.setting.quality_floor_rej,
            });
        }
        Ok(())
    }

    /// The scenario's out-of-pool candidate, if it passes the removal checks
    pub fn out_of_pool(
        &self,
        scenario: Scenario,
        task: Option<&TaskSpec>,
        input: &GateInput<'_>,
    ) -> Option<ScoredCandidate> {
        let raw = self.fallbacks.fallback(scenario, task)?;
        match self.admits(&raw, input) {
            Ok(()) => Some(ScoredCandidate::unscored(raw)),
            Err(reason) => {
                debug!(candidate_id = %raw.id, reason = reason.kind(), "Out-of-pool candidate not admissible");
                None
            }
        }
    }

    fn check_capabilities(
        &self,
        candidate: &RawCandidate,
        constraints: &Constraints,
    ) -> Result<(), RemovalReason> {
        let caps = &candidate.capabilities;
        if constraints.require_json_mode && !caps.json_mode {
            return Err(RemovalReason::JsonModeUnsupported);
        }
        if constraints.require_tool_use && !caps.tool_use {
            return Err(RemovalReason::ToolUseUnsupported);
        }

        let provider = candidate.provider();
        if let Some(provider) = provider {
            if constraints
                .deny_providers
                .iter()
                .any(|d| d.eq_ignore_ascii_case(provider))
            {
                return Err(RemovalReason::ProviderDenied {
                    provider: provider.to_string(),
                });
            }
        }
        if let Some(allow) = &constraints.allow_providers {
            let allowed = provider
                .map(|p| allow.iter().any(|a| a.eq_ignore_ascii_case(p)))
                .unwrap_or(false);
            if !allowed {
                return Err(RemovalReason::ProviderNotAllowed {
                    provider: provider.map(str::to_string),
                });
            }
        }

        if let Some(minimum) = constraints.min_safety_level {
            if caps.safety_level < minimum {
                return Err(RemovalReason::SafetyBelowMinimum {
                    level: caps.safety_level,
                    minimum,
                });
            }
        }
        Ok(())
    }

    fn check_breakers(&self, candidate: &RawCandidate) -> Result<(), RemovalReason> {
        match candidate
            .breaker_keys()
            .into_iter()
            .find(|key| self.health.is_open(key))
        {
            Some(key) => Err(RemovalReason::BreakerOpen { key }),
            None => Ok(()),
        }
    }

    fn apply_soft_penalties(&self, candidate: &mut ScoredCandidate, input: &GateInput<'_>) {
        let caps = &candidate.raw.capabilities;
        let latency_over = caps.est_latency_ms > input.setting.latency_soft_ms;
        let budget = self.policy.budgets.for_tier(input.context.budget_tier);
        let cost_over = caps.est_cost_usd > input.setting.cost_overrun_mul * budget;

        if latency_over {
            candidate.apply_penalty(PenaltyKind::LatencySoft, self.policy.soft_penalty);
        }
        if cost_over {
            candidate.apply_penalty(PenaltyKind::CostOverrun, self.policy.soft_penalty);
        }
    }

    fn check_hard_limits(&self, candidate: &RawCandidate, input: &GateInput<'_>) -> Result<(), RemovalReason> {
        let caps = &candidate.capabilities;
        let limit_ms = input.latency_ceiling();
        if caps.est_latency_ms > limit_ms {
            return Err(RemovalReason::LatencyOverLimit {
                estimated_ms: caps.est_latency_ms,
                limit_ms,
            });
        }
        if let Some(ceiling) = input.constraints.max_cost_usd {
            if caps.est_cost_usd > ceiling {
                return Err(RemovalReason::CostOverCeiling {
                    estimated_usd: caps.est_cost_usd,
                    ceiling_usd: ceiling,
                });
            }
        }
        Ok(())
    }

    fn check_quality_floor(
        candidate: &mut ScoredCandidate,
        setting: &RecommendationSetting,
    ) -> Result<(), RemovalReason> {
        let quality = candidate.raw.signals.quality;
        if quality < setting.quality_floor_rej {
            return Err(RemovalReason::QualityBelowFloor {
                quality,
                floor: setting.quality_floor_rej,
            });
        }
        candidate.reason.below_strict_floor = quality < setting.quality_floor_str;
        Ok(())
    }
}
