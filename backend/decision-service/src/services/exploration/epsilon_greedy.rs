use crate::models::{DecisionMode, ExploreFlags, ExploreSource, ScoredCandidate};
use rand::Rng;
use tracing::debug;

/// `max(epsilon, min_explore)`, clamped to [0, 1]
pub fn effective_rate(epsilon: f64, min_explore: f64) -> f64 {
    epsilon.max(min_explore).clamp(0.0, 1.0)
}

/// Relative odds of each explore source when more than one is available
#[derive(Debug, Clone, Copy)]
pub struct PoolWeights {
    pub fine_top2: f64,
    pub coarse_extra: f64,
    pub out_of_pool: f64,
}

impl Default for PoolWeights {
    fn default() -> Self {
        Self {
            fine_top2: 0.6,
            coarse_extra: 0.25,
            out_of_pool: 0.15,
        }
    }
}

pub struct ExplorationInput<'a> {
    /// Gated fine top-K, best first
    pub ranked: &'a [ScoredCandidate],
    pub coarse_extras: &'a [ScoredCandidate],
    pub out_of_pool: Option<&'a ScoredCandidate>,
    pub epsilon: f64,
    pub min_explore: f64,
    /// `options.explore`
    pub enabled: bool,
}

impl ExplorationInput<'_> {
    fn sources(&self) -> Vec<ExploreSource> {
        let mut sources = Vec::with_capacity(3);
        if self.ranked.len() >= 2 {
            sources.push(ExploreSource::FineTop2);
        }
        if !self.coarse_extras.is_empty() {
            sources.push(ExploreSource::CoarseExtra);
        }
        if self.out_of_pool.is_some() {
            sources.push(ExploreSource::OutOfPool);
        }
        sources
    }

    fn alternatives_available(&self) -> usize {
        self.ranked.len().saturating_sub(1)
            + self.coarse_extras.len()
            + usize::from(self.out_of_pool.is_some())
    }
}

/// Index into the list the choice was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Ranked(usize),
    CoarseExtra(usize),
    OutOfPool,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub choice: Choice,
    pub mode: DecisionMode,
    pub flags: ExploreFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ExplorationPolicy {
    weights: PoolWeights,
}

impl ExplorationPolicy {
    pub fn new(weights: PoolWeights) -> Self {
        Self { weights }
    }

    /// `None` only when there is nothing ranked to exploit
    pub fn select<R: Rng + ?Sized>(
        &self,
        input: &ExplorationInput<'_>,
        rng: &mut R,
    ) -> Option<Selection> {
        if input.ranked.is_empty() {
            return None;
        }

        let mut flags = ExploreFlags {
            effective_rate: effective_rate(input.epsilon, input.min_explore),
            alternatives_available: input.alternatives_available(),
            ..Default::default()
        };

        if !input.enabled {
            flags.disabled_by_request = true;
            return Some(Self::exploit(flags));
        }

        let roll: f64 = rng.gen();
        flags.roll = Some(roll);
        if roll >= flags.effective_rate {
            return Some(Self::exploit(flags));
        }

        let Some(source) = self.pick_source(&input.sources(), rng) else {
            debug!(roll, "Explore roll hit but no alternative is available");
            return Some(Self::exploit(flags));
        };

        let choice = match source {
            ExploreSource::FineTop2 => Choice::Ranked(1),
            ExploreSource::CoarseExtra => {
                Choice::CoarseExtra(rng.gen_range(0..input.coarse_extras.len()))
            }
            ExploreSource::OutOfPool => Choice::OutOfPool,
        };
        flags.source = Some(source);
        debug!(roll, ?source, "Exploring");

        Some(Selection {
            choice,
            mode: DecisionMode::Explore,
            flags,
        })
    }

    fn exploit(flags: ExploreFlags) -> Selection {
        Selection {
            choice: Choice::Ranked(0),
            mode: DecisionMode::Exploit,
            flags,
        }
    }

    fn weight(&self, source: ExploreSource) -> f64 {
        match source {
            ExploreSource::FineTop2 => self.weights.fine_top2,
            ExploreSource::CoarseExtra => self.weights.coarse_extra,
            ExploreSource::OutOfPool => self.weights.out_of_pool,
        }
        .max(0.0)
    }

    fn pick_source<R: Rng + ?Sized>(
        &self,
        sources: &[ExploreSource],
        rng: &mut R,
    ) -> Option<ExploreSource> {
        if sources.is_empty() {
            return None;
        }
        let total: f64 = sources.iter().map(|s| self.weight(*s)).sum();
        if total <= 0.0 {
            // every available source weighted zero: uniform
            return Some(sources[rng.gen_range(0..sources.len())]);
        }

        let mut target = rng.gen::<f64>() * total;
        for source in sources {
            let w = self.weight(*source);
            if target < w {
                return Some(*source);
            }
            target -= w;
        }
        sources.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawCandidate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn candidates(ids: &[&str]) -> Vec<ScoredCandidate> {
        ids.iter()
            .map(|id| {
                let raw: RawCandidate = serde_json::from_value(json!({
                    "id": id,
                    "profile": {"targetType": "style", "styleKey": id}
                }))
                .unwrap();
                ScoredCandidate::unscored(raw)
            })
            .collect()
    }

    #[test]
    fn test_effective_rate_is_a_floor() {
        assert_eq!(effective_rate(0.10, 0.05), 0.10);
        assert_eq!(effective_rate(0.01, 0.05), 0.05);
        assert_eq!(effective_rate(1.5, 0.0), 1.0);
    }

    #[test]
    fn test_explore_rate_converges() {
        let ranked = candidates(&["a", "b", "c"]);
        let extras = candidates(&["d"]);
        let input = ExplorationInput {
            ranked: &ranked,
            coarse_extras: &extras,
            out_of_pool: None,
            epsilon: 0.10,
            min_explore: 0.05,
            enabled: true,
        };
        let policy = ExplorationPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        let n = 20_000;
        let explored = (0..n)
            .filter(|_| policy.select(&input, &mut rng).unwrap().mode == DecisionMode::Explore)
            .count();
        let rate = explored as f64 / n as f64;

        // 4 sigma at p = 0.1 is about 0.0085
        assert!((rate - 0.10).abs() < 0.01, "observed explore rate {}", rate);
    }

    #[test]
    fn test_disabled_by_request_always_exploits() {
        let ranked = candidates(&["a", "b"]);
        let input = ExplorationInput {
            ranked: &ranked,
            coarse_extras: &[],
            out_of_pool: None,
            epsilon: 1.0,
            min_explore: 1.0,
            enabled: false,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let selection = ExplorationPolicy::default().select(&input, &mut rng).unwrap();

        assert_eq!(selection.choice, Choice::Ranked(0));
        assert!(selection.flags.disabled_by_request);
        assert!(selection.flags.roll.is_none());
    }

    #[test]
    fn test_explore_never_picks_rank_one() {
        let ranked = candidates(&["a", "b"]);
        let extras = candidates(&["x", "y"]);
        let oop = candidates(&["fallback-style"]);
        let input = ExplorationInput {
            ranked: &ranked,
            coarse_extras: &extras,
            out_of_pool: oop.first(),
            epsilon: 1.0,
            min_explore: 0.0,
            enabled: true,
        };
        let policy = ExplorationPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        let mut top2 = 0;
        for _ in 0..2000 {
            let selection = policy.select(&input, &mut rng).unwrap();
            assert_eq!(selection.mode, DecisionMode::Explore);
            assert_ne!(selection.choice, Choice::Ranked(0));
            if selection.choice == Choice::Ranked(1) {
                top2 += 1;
            }
        }
        // weighted toward the runner-up (0.6 of draws)
        assert!(top2 > 1000, "fineTop2 drawn {} times", top2);
    }

    #[test]
    fn test_no_alternatives_falls_back_to_exploit() {
        let ranked = candidates(&["only"]);
        let input = ExplorationInput {
            ranked: &ranked,
            coarse_extras: &[],
            out_of_pool: None,
            epsilon: 1.0,
            min_explore: 1.0,
            enabled: true,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let selection = ExplorationPolicy::default().select(&input, &mut rng).unwrap();

        assert_eq!(selection.mode, DecisionMode::Exploit);
        assert_eq!(selection.flags.alternatives_available, 0);
        assert!(selection.flags.source.is_none());
    }
}
