use super::{DecisionStore, RecordOutcome, SettingsStore, StoreError, StoreResult};
use crate::models::{
    CandidateSet, Decision, DecisionMode, DecisionStats, Event, Feedback, Outcome, OutcomePatch,
    RecommendationSetting, Scenario,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    candidate_sets: HashMap<Uuid, CandidateSet>,
    decisions: HashMap<Uuid, Decision>,
    outcomes: HashMap<Uuid, Outcome>,
    events: Vec<Event>,
    feedback: Vec<Feedback>,
    settings: HashMap<Scenario, RecommendationSetting>,
}

/// Single-process store used for development and tests
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision_count(&self) -> usize {
        self.tables.read().decisions.len()
    }

    pub fn outcome_count(&self) -> usize {
        self.tables.read().outcomes.len()
    }

    pub fn feedback_count(&self) -> usize {
        self.tables.read().feedback.len()
    }
}

#[async_trait::async_trait]
impl DecisionStore for InMemoryStore {
    async fn record_decision(
        &self,
        set: &CandidateSet,
        decision: &Decision,
    ) -> StoreResult<RecordOutcome> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.decisions.get(&decision.id) {
            return Ok(RecordOutcome::AlreadyRecorded(Box::new(existing.clone())));
        }
        if tables.candidate_sets.contains_key(&set.id) {
            return Err(StoreError::Conflict(format!(
                "candidate set {} already owned by another decision",
                set.id
            )));
        }
        tables.candidate_sets.insert(set.id, set.clone());
        tables.decisions.insert(decision.id, decision.clone());
        Ok(RecordOutcome::Inserted)
    }

    async fn get_decision(&self, id: Uuid) -> StoreResult<Option<Decision>> {
        Ok(self.tables.read().decisions.get(&id).cloned())
    }

    async fn get_candidate_set(&self, id: Uuid) -> StoreResult<Option<CandidateSet>> {
        Ok(self.tables.read().candidate_sets.get(&id).cloned())
    }

    async fn upsert_outcome(
        &self,
        decision_id: Uuid,
        patch: &OutcomePatch,
    ) -> StoreResult<Outcome> {
        let mut tables = self.tables.write();
        if !tables.decisions.contains_key(&decision_id) {
            return Err(StoreError::NotFound(format!("decision {}", decision_id)));
        }
        let now = Utc::now();
        let outcome = tables
            .outcomes
            .entry(decision_id)
            .or_insert_with(|| Outcome::empty(decision_id, now));
        patch.apply_to(outcome, now);
        Ok(outcome.clone())
    }

    async fn get_outcome(&self, decision_id: Uuid) -> StoreResult<Option<Outcome>> {
        Ok(self.tables.read().outcomes.get(&decision_id).cloned())
    }

    async fn append_event(&self, event: &Event) -> StoreResult<()> {
        self.tables.write().events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, decision_id: Uuid) -> StoreResult<Vec<Event>> {
        Ok(self
            .tables
            .read()
            .events
            .iter()
            .filter(|e| e.decision_id == decision_id)
            .cloned()
            .collect())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.tables.write().feedback.push(feedback.clone());
        Ok(())
    }

    async fn decision_stats(&self, since: DateTime<Utc>) -> StoreResult<DecisionStats> {
        let tables = self.tables.read();
        let (mut total, mut explore, mut fallback) = (0u64, 0u64, 0u64);
        for decision in tables.decisions.values().filter(|d| d.created_at >= since) {
            total += 1;
            if decision.mode == DecisionMode::Explore {
                explore += 1;
            }
            if decision.fallback_used() {
                fallback += 1;
            }
        }
        Ok(DecisionStats::from_counts(since, total, explore, fallback))
    }
}

#[async_trait::async_trait]
impl SettingsStore for InMemoryStore {
    async fn get_setting(&self, scenario: Scenario) -> StoreResult<Option<RecommendationSetting>> {
        Ok(self.tables.read().settings.get(&scenario).cloned())
    }

    async fn upsert_setting(
        &self,
        setting: &RecommendationSetting,
    ) -> StoreResult<RecommendationSetting> {
        let mut stored = setting.clone();
        stored.updated_at = Some(Utc::now());
        self.tables
            .write()
            .settings
            .insert(stored.scenario, stored.clone());
        Ok(stored)
    }
}
