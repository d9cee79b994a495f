use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Measured result of a decision. At most one per decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub decision_id: Uuid,
    pub latency_ms: Option<u64>,
    pub cost_actual: Option<f64>,
    pub quality_score: Option<f64>,
    pub conversion: Option<bool>,
    pub rejected: Option<bool>,
    pub edit_distance: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outcome {
    pub fn empty(decision_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            decision_id,
            latency_ms: None,
            cost_actual: None,
            quality_score: None,
            conversion: None,
            rejected: None,
            edit_distance: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields supplied by one feedback post. `None` means "keep what is stored".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomePatch {
    pub latency_ms: Option<u64>,
    pub cost_actual: Option<f64>,
    pub quality_score: Option<f64>,
    pub conversion: Option<bool>,
    pub rejected: Option<bool>,
    pub edit_distance: Option<f64>,
    pub notes: Option<String>,
}

impl OutcomePatch {
    pub fn is_empty(&self) -> bool {
        self.latency_ms.is_none()
            && self.cost_actual.is_none()
            && self.quality_score.is_none()
            && self.conversion.is_none()
            && self.rejected.is_none()
            && self.edit_distance.is_none()
            && self.notes.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(q) = self.quality_score {
            if !q.is_finite() || !(0.0..=1.0).contains(&q) {
                return Err(format!("qualityScore must be within [0, 1], got {}", q));
            }
        }
        if let Some(cost) = self.cost_actual {
            if !cost.is_finite() || cost < 0.0 {
                return Err(format!("costActual must be non-negative, got {}", cost));
            }
        }
        if let Some(d) = self.edit_distance {
            if !d.is_finite() || d < 0.0 {
                return Err(format!("editDistance must be non-negative, got {}", d));
            }
        }
        Ok(())
    }

    /// Merge into an existing outcome, field by field
    pub fn apply_to(&self, outcome: &mut Outcome, now: DateTime<Utc>) {
        if let Some(v) = self.latency_ms {
            outcome.latency_ms = Some(v);
        }
        if let Some(v) = self.cost_actual {
            outcome.cost_actual = Some(v);
        }
        if let Some(v) = self.quality_score {
            outcome.quality_score = Some(v);
        }
        if let Some(v) = self.conversion {
            outcome.conversion = Some(v);
        }
        if let Some(v) = self.rejected {
            outcome.rejected = Some(v);
        }
        if let Some(v) = self.edit_distance {
            outcome.edit_distance = Some(v);
        }
        if let Some(v) = &self.notes {
            outcome.notes = Some(v.clone());
        }
        outcome.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Expose,
    Select,
    AutoSelect,
    ExecuteStart,
    ExecuteComplete,
    ImplicitPositive,
    ImplicitNegative,
    ExplicitFeedback,
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Expose => "expose",
            EventType::Select => "select",
            EventType::AutoSelect => "auto_select",
            EventType::ExecuteStart => "execute_start",
            EventType::ExecuteComplete => "execute_complete",
            EventType::ImplicitPositive => "implicit_positive",
            EventType::ImplicitNegative => "implicit_negative",
            EventType::ExplicitFeedback => "explicit_feedback",
            EventType::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expose" => Ok(EventType::Expose),
            "select" => Ok(EventType::Select),
            "auto_select" => Ok(EventType::AutoSelect),
            "execute_start" => Ok(EventType::ExecuteStart),
            "execute_complete" => Ok(EventType::ExecuteComplete),
            "implicit_positive" => Ok(EventType::ImplicitPositive),
            "implicit_negative" => Ok(EventType::ImplicitNegative),
            "explicit_feedback" => Ok(EventType::ExplicitFeedback),
            "custom" => Ok(EventType::Custom),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Append-only log entry attached to a decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(decision_id: Uuid, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision_id,
            event_type,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Explicit user correction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub feedback_type: Option<String>,
    pub chosen_candidate_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Signal inferred from downstream behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ImplicitPositive,
    ImplicitNegative,
}

impl SignalKind {
    pub fn event_type(&self) -> EventType {
        match self {
            SignalKind::ImplicitPositive => EventType::ImplicitPositive,
            SignalKind::ImplicitNegative => EventType::ImplicitNegative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_keeps_omitted_fields() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut outcome = Outcome::empty(id, now);

        OutcomePatch {
            latency_ms: Some(500),
            ..Default::default()
        }
        .apply_to(&mut outcome, now);
        OutcomePatch {
            quality_score: Some(0.8),
            ..Default::default()
        }
        .apply_to(&mut outcome, now);

        assert_eq!(outcome.latency_ms, Some(500));
        assert_eq!(outcome.quality_score, Some(0.8));
    }

    #[test]
    fn test_patch_validation() {
        let patch = OutcomePatch {
            quality_score: Some(1.5),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(OutcomePatch::default().is_empty());
    }

    #[test]
    fn test_event_type_names() {
        for name in ["expose", "auto_select", "implicit_negative", "custom"] {
            let parsed: EventType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!("clicked".parse::<EventType>().is_err());
    }
}
