// ============================================
// Simple Coarse Scorer
// ============================================
//
// Features used:
// - relevance, quality, diversity (precomputed signals)
// - recency (exponential decay of signal age, measured at pool fetch time)

use super::{CoarseRankingError, Result};
use crate::models::{
    by_score_then_id, CandidateReason, FactorContribution, RawCandidate, ScoredCandidate,
};
use crate::services::weights::CoarseWeights;
use crate::utils::exponential_decay;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Recency score used when a candidate carries no `updatedAt`
const UNKNOWN_RECENCY: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct CoarseOutcome {
    /// Top `mCoarse`, best first
    pub survivors: Vec<ScoredCandidate>,
    /// Next few below the cut, best first
    pub extras: Vec<ScoredCandidate>,
}

/// Coarse ranking layer
pub struct CoarseRankingLayer {
    extras_limit: usize,
    recency_half_life_hours: f64,
}

impl CoarseRankingLayer {
    pub fn new(extras_limit: usize) -> Self {
        Self {
            extras_limit,
            recency_half_life_hours: 72.0,
        }
    }

    pub fn with_half_life(mut self, hours: f64) -> Self {
        self.recency_half_life_hours = hours;
        self
    }

    pub fn extras_limit(&self) -> usize {
        self.extras_limit
    }

    /// Score, sort and cut to `m_coarse`
    pub fn rank(
        &self,
        candidates: Vec<RawCandidate>,
        weights: &CoarseWeights,
        m_coarse: usize,
        as_of: DateTime<Utc>,
    ) -> Result<CoarseOutcome> {
        if m_coarse == 0 {
            return Err(CoarseRankingError::InvalidInput(
                "mCoarse must be at least 1".to_string(),
            ));
        }
        if candidates.is_empty() {
            return Ok(CoarseOutcome::default());
        }

        let input_count = candidates.len();

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|c| self.score(c, weights, as_of))
            .collect();

        scored.sort_by(|a, b| by_score_then_id(a.coarse_score, a.id(), b.coarse_score, b.id()));

        let extras: Vec<ScoredCandidate> = if scored.len() > m_coarse {
            scored
                .split_off(m_coarse)
                .into_iter()
                .take(self.extras_limit)
                .collect()
        } else {
            Vec::new()
        };

        info!(
            input_count = input_count,
            output_count = scored.len(),
            extras = extras.len(),
            "Coarse ranking completed"
        );

        Ok(CoarseOutcome {
            survivors: scored,
            extras,
        })
    }

    fn score(&self, candidate: RawCandidate, weights: &CoarseWeights, as_of: DateTime<Utc>) -> ScoredCandidate {
        let signals = &candidate.signals;
        let recency = self.compute_recency_score(signals.updated_at, as_of);

        let factors = vec![
            FactorContribution {
                factor: "relevance".into(),
                value: signals.relevance,
                weight: weights.relevance,
            },
            FactorContribution {
                factor: "quality".into(),
                value: signals.quality,
                weight: weights.quality,
            },
            FactorContribution {
                factor: "diversity".into(),
                value: signals.diversity,
                weight: weights.diversity,
            },
            FactorContribution {
                factor: "recency".into(),
                value: recency,
                weight: weights.recency,
            },
        ];
        let score: f64 = factors.iter().map(|f| f.value * f.weight).sum();

        debug!(
            candidate_id = %candidate.id,
            relevance = signals.relevance,
            quality = signals.quality,
            recency = recency,
            score = score,
            "Coarse score computed"
        );

        let reason = CandidateReason {
            coarse_factors: factors,
            category: candidate.category.clone(),
            tags: candidate.tags.clone(),
            provider: candidate.provider().map(str::to_string),
            ..Default::default()
        };

        ScoredCandidate {
            raw: candidate,
            coarse_score: score,
            fine_score: None,
            final_score: score,
            reason,
        }
    }

    /// Fresh (0h) = 1.0, one half-life = 0.5
    fn compute_recency_score(&self, updated_at: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> f64 {
        match updated_at {
            Some(ts) => {
                let age_hours = (as_of - ts).num_seconds().max(0) as f64 / 3600.0;
                exponential_decay(age_hours, self.recency_half_life_hours)
            }
            None => UNKNOWN_RECENCY,
        }
    }
}
