use crate::models::{FeedbackRequest, SignalKind};
use serde::Serialize;
use serde_json::Value;

/// Behavioural inputs for implicit-signal inference. Counts come from the
/// feedback payload (a number, or an array whose length is the count);
/// `editDistance` from the top-level field, else the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplicitInputs {
    pub added_selling_points: Option<u64>,
    pub added_pain_points: Option<u64>,
    pub rerun_count: Option<u64>,
    pub edit_distance: Option<f64>,
}

impl ImplicitInputs {
    pub fn from_request(request: &FeedbackRequest) -> Self {
        let payload = request.payload.as_ref();
        let field = |name: &str| payload.and_then(|p| p.get(name));

        Self {
            added_selling_points: field("addedSellingPoints").and_then(count),
            added_pain_points: field("addedPainPoints").and_then(count),
            rerun_count: field("rerunCount").and_then(count),
            edit_distance: request
                .edit_distance
                .or_else(|| field("editDistance").and_then(Value::as_f64)),
        }
    }

    fn has_counts(&self) -> bool {
        self.added_selling_points.is_some()
            || self.added_pain_points.is_some()
            || self.rerun_count.is_some()
    }
}

fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Array(items) => Some(items.len() as u64),
        other => other
            .as_u64()
            .or_else(|| other.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
    }
}

/// Count rule first, then the edit-distance override:
/// - added == 0 or reruns > 1 → negative
/// - added >= 3 and no reruns → positive
/// - editDistance > 0.3 → negative, whatever came before
///
/// The count rule only runs when at least one count was reported.
pub fn infer_implicit_signal(inputs: &ImplicitInputs) -> Option<SignalKind> {
    let mut signal = None;

    if inputs.has_counts() {
        let added = inputs.added_selling_points.unwrap_or(0) + inputs.added_pain_points.unwrap_or(0);
        let reruns = inputs.rerun_count.unwrap_or(0);

        if added == 0 || reruns > 1 {
            signal = Some(SignalKind::ImplicitNegative);
        } else if added >= 3 && reruns == 0 {
            signal = Some(SignalKind::ImplicitPositive);
        }
    }

    if inputs.edit_distance.is_some_and(|d| d > 0.3) {
        signal = Some(SignalKind::ImplicitNegative);
    }

    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn inputs(sp: u64, pp: u64, rerun: Option<u64>, edit: Option<f64>) -> ImplicitInputs {
        ImplicitInputs {
            added_selling_points: Some(sp),
            added_pain_points: Some(pp),
            rerun_count: rerun,
            edit_distance: edit,
        }
    }

    #[test]
    fn test_edit_distance_overrides_positive() {
        assert_eq!(
            infer_implicit_signal(&inputs(5, 0, Some(0), Some(0.35))),
            Some(SignalKind::ImplicitNegative)
        );
    }

    #[test]
    fn test_count_rule() {
        assert_eq!(infer_implicit_signal(&inputs(0, 0, None, None)), Some(SignalKind::ImplicitNegative));
        assert_eq!(infer_implicit_signal(&inputs(4, 1, Some(2), None)), Some(SignalKind::ImplicitNegative));
        assert_eq!(infer_implicit_signal(&inputs(2, 1, None, Some(0.1))), Some(SignalKind::ImplicitPositive));
        // one rerun is neither
        assert_eq!(infer_implicit_signal(&inputs(3, 0, Some(1), None)), None);
        assert_eq!(infer_implicit_signal(&inputs(1, 1, Some(0), None)), None);
    }

    #[test]
    fn test_no_inputs_no_signal() {
        assert_eq!(infer_implicit_signal(&ImplicitInputs::default()), None);
        let edit_only = ImplicitInputs {
            edit_distance: Some(0.5),
            ..Default::default()
        };
        assert_eq!(infer_implicit_signal(&edit_only), Some(SignalKind::ImplicitNegative));
    }

    #[test]
    fn test_inputs_from_payload() {
        let request = FeedbackRequest {
            decision_id: Uuid::new_v4(),
            payload: Some(json!({
                "addedSellingPoints": ["fast", "cheap", "fun"],
                "addedPainPoints": 1,
                "editDistance": 0.2
            })),
            ..Default::default()
        };
        let inputs = ImplicitInputs::from_request(&request);

        assert_eq!(inputs.added_selling_points, Some(3));
        assert_eq!(inputs.added_pain_points, Some(1));
        assert_eq!(inputs.rerun_count, None);
        assert_eq!(inputs.edit_distance, Some(0.2));
    }
}
