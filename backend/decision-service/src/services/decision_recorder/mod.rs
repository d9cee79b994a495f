// ============================================
// Decision Recorder
// ============================================
//
// Ids are derived before anything is written:
// - decisionId: UUIDv5(scenario + requestId) when the caller supplies a
//   requestId, random otherwise
// - candidateSetId: UUIDv5(decisionId)
// A retried request therefore lands on the same rows and the store's
// ON CONFLICT path reports `AlreadyRecorded` instead of inserting twice.

use crate::error::{AppError, Result};
use crate::models::{CandidateSet, Decision, Scenario};
use crate::services::metrics::DecisionMetrics;
use crate::store::{DecisionStore, RecordOutcome, StoreError};
use resilience::{with_retry_if, RetryConfig};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const DECISION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d4e_8a3b_4c5d_9e6f_7a8b_9c0d_1e2f);

pub fn decision_id(scenario: Scenario, request_id: Option<&str>) -> Uuid {
    match request_id {
        Some(request_id) => Uuid::new_v5(
            &DECISION_NAMESPACE,
            format!("{}:{}", scenario.as_str(), request_id).as_bytes(),
        ),
        None => Uuid::new_v4(),
    }
}

pub fn candidate_set_id(decision_id: Uuid) -> Uuid {
    Uuid::new_v5(&decision_id, b"candidate-set")
}

#[derive(Clone)]
pub struct DecisionRecorder {
    store: Arc<dyn DecisionStore>,
    retry: RetryConfig,
}

impl DecisionRecorder {
    pub fn new(store: Arc<dyn DecisionStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Durably write the set and decision. Transient store errors are
    /// retried; anything left over is a `Persistence` error.
    pub async fn record(&self, set: &CandidateSet, decision: &Decision) -> Result<RecordOutcome> {
        let result = with_retry_if(
            self.retry.clone(),
            StoreError::is_transient,
            || self.store.record_decision(set, decision),
        )
        .await;

        match result {
            Ok(RecordOutcome::Inserted) => {
                info!(
                    decision_id = %decision.id,
                    candidate_set_id = %set.id,
                    chosen = %decision.chosen_target_id,
                    mode = decision.mode.as_str(),
                    "Decision recorded"
                );
                Ok(RecordOutcome::Inserted)
            }
            Ok(existing @ RecordOutcome::AlreadyRecorded(_)) => {
                info!(decision_id = %decision.id, "Decision already recorded, reusing stored snapshot");
                Ok(existing)
            }
            Err(e) => {
                let e = e.into_inner();
                error!(decision_id = %decision.id, error = %e, "Failed to record decision");
                DecisionMetrics::record_persistence_failure("record_decision");
                Err(AppError::Persistence(e.to_string()))
            }
        }
    }
}
