//! Persistence boundary for decisions, outcomes, events and settings

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::models::{
    CandidateSet, Decision, DecisionStats, Event, Feedback, Outcome, OutcomePatch,
    RecommendationSetting, Scenario,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Connection or pool level failure; safe to retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Check if error is transient (should retry)
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result of an idempotent decision write
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted,
    /// A decision with this id already exists; carries the stored copy
    AlreadyRecorded(Box<Decision>),
}

#[async_trait::async_trait]
pub trait DecisionStore: Send + Sync {
    /// Persist the candidate set and its decision together. Idempotent on
    /// `decision.id`: a repeat write never creates a second row.
    async fn record_decision(
        &self,
        set: &CandidateSet,
        decision: &Decision,
    ) -> StoreResult<RecordOutcome>;

    async fn get_decision(&self, id: Uuid) -> StoreResult<Option<Decision>>;

    async fn get_candidate_set(&self, id: Uuid) -> StoreResult<Option<CandidateSet>>;

    /// Create the outcome on first call, merge field-wise afterwards
    async fn upsert_outcome(&self, decision_id: Uuid, patch: &OutcomePatch)
        -> StoreResult<Outcome>;

    async fn get_outcome(&self, decision_id: Uuid) -> StoreResult<Option<Outcome>>;

    async fn append_event(&self, event: &Event) -> StoreResult<()>;

    async fn list_events(&self, decision_id: Uuid) -> StoreResult<Vec<Event>>;

    async fn insert_feedback(&self, feedback: &Feedback) -> StoreResult<()>;

    async fn decision_stats(&self, since: DateTime<Utc>) -> StoreResult<DecisionStats>;
}

#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, scenario: Scenario) -> StoreResult<Option<RecommendationSetting>>;

    async fn upsert_setting(
        &self,
        setting: &RecommendationSetting,
    ) -> StoreResult<RecommendationSetting>;
}
