// ============================================
// Coarse Ranking Layer
// ============================================
//
// Pipeline: Pool → Coarse → Fine → Gate → Exploration
//
// Purpose:
// - Prune the sourced pool down to `mCoarse` survivors for fine ranking
// - Cheap weighted sum over precomputed signals plus recency
// - Deterministic: ties broken by candidate id so repeat requests agree

pub mod simple_scorer;

pub use simple_scorer::{CoarseOutcome, CoarseRankingLayer};

use crate::services::weights::WeightError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoarseRankingError {
    #[error("Invalid weight configuration: {0}")]
    InvalidWeights(#[from] WeightError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CoarseRankingError>;
