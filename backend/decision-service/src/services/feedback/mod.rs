// ============================================
// Feedback Ingestion
// ============================================
//
// One feedback post may carry any mix of:
// - an explicit correction (userChoice / type / reason) → Feedback row + explicit_feedback event
// - an eventType (+ payload) → appended as-is, unknown names become `custom`
// - outcome fields → upserted field by field into the single Outcome row
// - implicit inputs (payload counts, editDistance) → inferred signal event

mod implicit;

pub use implicit::{infer_implicit_signal, ImplicitInputs};

use crate::error::{AppError, Result};
use crate::models::{Event, EventType, Feedback, FeedbackRequest, FeedbackResponse};
use crate::services::metrics::{DecisionMetrics, MetricsAggregator};
use crate::store::DecisionStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct FeedbackIngestor {
    store: Arc<dyn DecisionStore>,
    metrics: MetricsAggregator,
}

impl FeedbackIngestor {
    pub fn new(store: Arc<dyn DecisionStore>, metrics: MetricsAggregator) -> Self {
        Self { store, metrics }
    }

    pub async fn ingest(&self, request: FeedbackRequest) -> Result<FeedbackResponse> {
        let patch = request.outcome_patch();
        patch.validate().map_err(AppError::Validation)?;

        let decision_id = request.decision_id;
        if self.store.get_decision(decision_id).await?.is_none() {
            return Err(AppError::NotFound(format!("decision {}", decision_id)));
        }

        let mut events = Vec::new();
        let mut feedback_id = None;

        if request.is_explicit() {
            let feedback = Feedback {
                id: Uuid::new_v4(),
                decision_id,
                feedback_type: request.feedback_type.clone(),
                chosen_candidate_id: request.user_choice.clone(),
                reason: request.reason.clone(),
                created_at: Utc::now(),
            };
            self.store.insert_feedback(&feedback).await?;
            feedback_id = Some(feedback.id);

            self.append(
                decision_id,
                EventType::ExplicitFeedback,
                json!({
                    "feedbackId": feedback.id,
                    "type": feedback.feedback_type,
                    "userChoice": feedback.chosen_candidate_id,
                    "reason": feedback.reason,
                }),
                &mut events,
            )
            .await?;
        }

        if let Some(name) = request.event_type.as_deref() {
            let payload = request.payload.clone().unwrap_or(Value::Null);
            let (event_type, payload) = match name.parse::<EventType>() {
                Ok(event_type) => (event_type, payload),
                Err(_) => (EventType::Custom, json!({"name": name, "payload": payload})),
            };
            self.append(decision_id, event_type, payload, &mut events).await?;
        }

        let outcome = if patch.is_empty() {
            None
        } else {
            let outcome = self.store.upsert_outcome(decision_id, &patch).await?;
            self.metrics.record_outcome(&outcome);
            debug!(%decision_id, "Outcome upserted");
            Some(outcome)
        };

        let inputs = ImplicitInputs::from_request(&request);
        if let Some(signal) = infer_implicit_signal(&inputs) {
            self.append(
                decision_id,
                signal.event_type(),
                json!({"reason": "auto_inferred", "inputs": inputs}),
                &mut events,
            )
            .await?;
        }

        info!(
            %decision_id,
            events = events.len(),
            outcome = outcome.is_some(),
            explicit = feedback_id.is_some(),
            "Feedback ingested"
        );

        Ok(FeedbackResponse {
            decision_id,
            feedback_id,
            outcome,
            events,
        })
    }

    async fn append(
        &self,
        decision_id: Uuid,
        event_type: EventType,
        payload: Value,
        events: &mut Vec<EventType>,
    ) -> Result<()> {
        let event = Event::new(decision_id, event_type, payload);
        self.store.append_event(&event).await?;
        DecisionMetrics::record_feedback_event(event_type.as_str());
        events.push(event_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metrics::AlertThresholds;
    use crate::store::InMemoryStore;

    fn ingestor() -> (FeedbackIngestor, InMemoryStore) {
        let store = InMemoryStore::new();
        let metrics = MetricsAggregator::new(chrono::Duration::hours(1), 100, AlertThresholds::default());
        (FeedbackIngestor::new(Arc::new(store.clone()), metrics), store)
    }

    #[tokio::test]
    async fn test_unknown_decision_is_not_found() {
        let (ingestor, _) = ingestor();
        let err = ingestor
            .ingest(FeedbackRequest {
                decision_id: Uuid::new_v4(),
                latency_ms: Some(100),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_outcome_is_rejected_before_lookup() {
        let (ingestor, _) = ingestor();
        let err = ingestor
            .ingest(FeedbackRequest {
                decision_id: Uuid::new_v4(),
                quality_score: Some(2.0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
