// ============================================
// Exploration Module
// ============================================
//
// Epsilon-greedy with a floor: effective rate = max(epsilon, minExplore).
//
// On explore the policy skips fine rank 1 and samples a source, weighted
// toward the fine runner-up:
// 1. fineTop2 (gated rank 2)
// 2. coarse-extra (below the coarse cut, gate-admissible only)
// 3. out-of-pool (scenario fallback provider)
//
// With diversity on, candidates overlapping the subject's recent picks
// are down-ranked before sampling.

pub mod diversity;
pub mod epsilon_greedy;

pub use diversity::{DiversityPenalty, RecentChoice, RecentChoiceLog};
pub use epsilon_greedy::{
    effective_rate, Choice, ExplorationInput, ExplorationPolicy, PoolWeights, Selection,
};
