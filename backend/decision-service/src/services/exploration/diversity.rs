use crate::models::{by_score_then_id, PenaltyKind, ScoredCandidate};
use crate::utils::jaccard;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A candidate previously chosen for a subject
#[derive(Debug, Clone)]
pub struct RecentChoice {
    pub target_id: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Subject count that triggers the first stale sweep on insert
const SWEEP_FLOOR: usize = 1024;

/// Last few choices per subject, bounded by count and age. Subjects whose
/// choices all aged out are dropped on read and by periodic sweeps on insert.
#[derive(Clone)]
pub struct RecentChoiceLog {
    entries: Arc<DashMap<String, VecDeque<RecentChoice>>>,
    lookback: usize,
    window: Duration,
    sweep_at: Arc<AtomicUsize>,
}

impl RecentChoiceLog {
    pub fn new(lookback: usize, window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            lookback,
            window,
            sweep_at: Arc::new(AtomicUsize::new(SWEEP_FLOOR)),
        }
    }

    pub fn record(&self, subject_ref: &str, chosen: &ScoredCandidate, at: DateTime<Utc>) {
        if self.lookback == 0 {
            return;
        }
        if !self.entries.contains_key(subject_ref)
            && self.entries.len() >= self.sweep_at.load(Ordering::Relaxed)
        {
            self.sweep(at);
            let next = (self.entries.len() * 2).max(SWEEP_FLOOR);
            self.sweep_at.store(next, Ordering::Relaxed);
        }

        let mut entry = self.entries.entry(subject_ref.to_string()).or_default();
        entry.push_back(RecentChoice {
            target_id: chosen.raw.id.clone(),
            category: chosen.raw.category.clone(),
            tags: chosen.raw.tags.clone(),
            at,
        });
        while entry.len() > self.lookback {
            entry.pop_front();
        }
    }

    /// Choices still inside the window, oldest first
    pub fn recent(&self, subject_ref: &str, now: DateTime<Utc>) -> Vec<RecentChoice> {
        let cutoff = now - self.window;
        let recent: Vec<RecentChoice> = match self.entries.get_mut(subject_ref) {
            Some(mut entry) => {
                entry.retain(|c| c.at >= cutoff);
                entry.iter().cloned().collect()
            }
            None => return Vec::new(),
        };
        if recent.is_empty() {
            self.entries.remove_if(subject_ref, |_, choices| choices.is_empty());
        }
        recent
    }

    /// Drops aged-out choices everywhere; returns how many subjects were removed
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.entries.len();
        self.entries.retain(|_, choices| {
            choices.retain(|c| c.at >= cutoff);
            !choices.is_empty()
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept stale recent-choice subjects");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) -> usize {
        let subjects = self.entries.len();
        self.entries.clear();
        subjects
    }
}

/// `score × (1 − strength × overlap)`, where overlap is 1 for a shared
/// category and the tag Jaccard otherwise (max over recent choices)
#[derive(Debug, Clone, Copy)]
pub struct DiversityPenalty {
    strength: f64,
}

impl DiversityPenalty {
    pub fn new(strength: f64) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
        }
    }

    pub fn overlap(candidate: &ScoredCandidate, recent: &[RecentChoice]) -> f64 {
        recent
            .iter()
            .map(|r| {
                let same_category = match (&candidate.raw.category, &r.category) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => false,
                };
                if same_category {
                    1.0
                } else {
                    jaccard(&candidate.raw.tags, &r.tags)
                }
            })
            .fold(0.0, f64::max)
    }

    /// Penalise in place and re-sort; returns whether anything was penalised
    pub fn apply(&self, candidates: &mut [ScoredCandidate], recent: &[RecentChoice]) -> bool {
        if recent.is_empty() || self.strength == 0.0 {
            return false;
        }

        let mut applied = false;
        for candidate in candidates.iter_mut() {
            let overlap = Self::overlap(candidate, recent);
            if overlap > 0.0 {
                let multiplier = 1.0 - self.strength * overlap;
                debug!(candidate_id = %candidate.raw.id, overlap, multiplier, "Diversity penalty");
                candidate.apply_penalty(PenaltyKind::Diversity, multiplier);
                applied = true;
            }
        }

        if applied {
            candidates.sort_by(|a, b| by_score_then_id(a.final_score, a.id(), b.final_score, b.id()));
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawCandidate;
    use serde_json::json;

    fn style(id: &str, category: &str, tags: &[&str], score: f64) -> ScoredCandidate {
        let raw: RawCandidate = serde_json::from_value(json!({
            "id": id,
            "category": category,
            "tags": tags,
            "profile": {"targetType": "style", "styleKey": id}
        }))
        .unwrap();
        let mut scored = ScoredCandidate::unscored(raw);
        scored.final_score = score;
        scored
    }

    #[test]
    fn test_log_is_bounded_by_count_and_age() {
        let log = RecentChoiceLog::new(2, Duration::hours(1));
        let now = Utc::now();
        log.record("job-1", &style("a", "warm", &[], 0.0), now - Duration::hours(2));
        log.record("job-1", &style("b", "warm", &[], 0.0), now);
        log.record("job-1", &style("c", "cool", &[], 0.0), now);

        let recent = log.recent("job-1", now);
        let ids: Vec<_> = recent.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(log.recent("job-2", now).is_empty());

        assert_eq!(log.clear(), 1);
        assert!(log.recent("job-1", now).is_empty());
    }

    #[test]
    fn test_aged_out_subjects_are_dropped() {
        let log = RecentChoiceLog::new(3, Duration::hours(1));
        let now = Utc::now();
        log.record("job-1", &style("a", "warm", &[], 0.0), now - Duration::hours(3));
        log.record("job-2", &style("b", "warm", &[], 0.0), now - Duration::hours(2));
        log.record("job-3", &style("c", "cool", &[], 0.0), now);
        assert_eq!(log.len(), 3);

        assert!(log.recent("job-1", now).is_empty());
        assert_eq!(log.len(), 2);

        assert_eq!(log.sweep(now), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.recent("job-3", now).len(), 1);
    }

    #[test]
    fn test_insert_sweeps_once_the_log_grows() {
        let log = RecentChoiceLog::new(1, Duration::minutes(5));
        let start = Utc::now();
        for i in 0..SWEEP_FLOOR {
            log.record(&format!("job-{}", i), &style("a", "warm", &[], 0.0), start);
        }
        assert_eq!(log.len(), SWEEP_FLOOR);

        // every earlier subject is outside the window by now
        let later = start + Duration::hours(1);
        log.record("job-new", &style("b", "cool", &[], 0.0), later);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_repeat_category_is_demoted() {
        let log = RecentChoiceLog::new(5, Duration::days(1));
        let now = Utc::now();
        log.record("job-1", &style("old", "neon", &["bold"], 0.0), now);

        let mut candidates = vec![
            style("neon-2", "neon", &[], 0.9),
            style("pastel", "pastel", &["soft"], 0.8),
        ];
        let applied = DiversityPenalty::new(0.3).apply(&mut candidates, &log.recent("job-1", now));

        assert!(applied);
        assert_eq!(candidates[0].id(), "pastel");
        assert!((candidates[1].final_score - 0.63).abs() < 1e-9);
    }

    #[test]
    fn test_tag_overlap_is_partial() {
        let recent = vec![RecentChoice {
            target_id: "old".into(),
            category: None,
            tags: vec!["bold".into(), "retro".into()],
            at: Utc::now(),
        }];
        let candidate = style("new", "other", &["bold", "clean"], 1.0);
        let overlap = DiversityPenalty::overlap(&candidate, &recent);
        assert!((overlap - 1.0 / 3.0).abs() < 1e-9);
    }
}
