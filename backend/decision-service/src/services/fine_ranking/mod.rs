// ============================================
// Fine Ranking Layer
// ============================================
//
// Re-scores coarse survivors with the business-facing factor set and
// keeps the top `kFine`. Anything below the cut is never promoted later;
// it can only surface again as a coarse extra.

use crate::models::{by_score_then_id, FactorContribution, ScoredCandidate};
use crate::services::weights::FineWeights;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct FineOutcome {
    /// Best first; index 0 is the provisional pick, index 1 the runner-up
    pub top_k: Vec<ScoredCandidate>,
    /// Survivors that missed the cut, best first
    pub dropped: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, Default)]
pub struct FineRankingLayer;

impl FineRankingLayer {
    pub fn new() -> Self {
        Self
    }

    pub fn rank(
        &self,
        survivors: Vec<ScoredCandidate>,
        weights: &FineWeights,
        k_fine: usize,
    ) -> FineOutcome {
        if survivors.is_empty() {
            return FineOutcome::default();
        }
        let input_count = survivors.len();

        let mut scored: Vec<ScoredCandidate> = survivors
            .into_iter()
            .map(|c| Self::score(c, weights))
            .collect();

        // fine score first, then coarse score, then id
        scored.sort_by(|a, b| {
            let fa = a.fine_score.unwrap_or(0.0);
            let fb = b.fine_score.unwrap_or(0.0);
            fb.partial_cmp(&fa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| by_score_then_id(a.coarse_score, a.id(), b.coarse_score, b.id()))
        });

        let dropped = if scored.len() > k_fine {
            scored.split_off(k_fine)
        } else {
            Vec::new()
        };

        info!(
            input_count = input_count,
            output_count = scored.len(),
            "Fine ranking completed"
        );

        FineOutcome {
            top_k: scored,
            dropped,
        }
    }

    fn score(mut candidate: ScoredCandidate, weights: &FineWeights) -> ScoredCandidate {
        let signals = &candidate.raw.signals;
        let factors = vec![
            FactorContribution {
                factor: "userPreference".into(),
                value: signals.user_preference,
                weight: weights.user_preference,
            },
            FactorContribution {
                factor: "businessValue".into(),
                value: signals.business_value,
                weight: weights.business_value,
            },
            FactorContribution {
                factor: "technicalQuality".into(),
                value: signals.technical_quality,
                weight: weights.technical_quality,
            },
            FactorContribution {
                factor: "marketTrend".into(),
                value: signals.market_trend,
                weight: weights.market_trend,
            },
        ];
        let score: f64 = factors.iter().map(|f| f.value * f.weight).sum();

        debug!(candidate_id = %candidate.raw.id, score = score, "Fine score computed");

        candidate.fine_score = Some(score);
        candidate.final_score = score;
        candidate.reason.fine_factors = factors;
        candidate
    }
}
