// ============================================
// Decision Metrics
// ============================================
//
// Two views of the same traffic:
// - `MetricsAggregator`: rolling in-process window over recent decisions
//   and their outcomes; segment breakdown, CSV export, threshold alerts
// - `DecisionMetrics`: monotonic Prometheus counters for scraping

mod aggregator;
mod counters;

pub use aggregator::{
    Alert, AlertKind, AlertThresholds, MetricsAggregator, MetricsSample, MetricsSnapshot,
    SegmentMetrics, ALL_SEGMENTS,
};
pub use counters::DecisionMetrics;

use crate::models::{ContextSpec, Scenario, TaskSpec};

/// Render a segment template. Unknown placeholders are left as-is and
/// missing values render as `unknown`.
pub fn render_segment(
    template: &str,
    scenario: Scenario,
    task: Option<&TaskSpec>,
    context: &ContextSpec,
) -> String {
    let or_unknown = |v: Option<&str>| v.unwrap_or("unknown").to_string();
    let category = or_unknown(task.and_then(|t| t.category.as_deref()));
    let region = or_unknown(context.region.as_deref());
    let channel = or_unknown(context.channel.as_deref());
    let tier = or_unknown(context.budget_tier.map(|t| t.as_str()));

    template
        .replace("{scenario}", scenario.as_str())
        .replace("{category}", &category)
        .replace("{region}", &region)
        .replace("{channel}", &channel)
        .replace("{budgetTier}", &tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BudgetTier;

    #[test]
    fn test_render_segment() {
        let task = TaskSpec {
            subject_ref: "job-1".into(),
            category: Some("ads".into()),
            ..Default::default()
        };
        let context = ContextSpec {
            budget_tier: Some(BudgetTier::Premium),
            ..Default::default()
        };

        assert_eq!(
            render_segment("{scenario}:{category}", Scenario::Prompt, Some(&task), &context),
            "prompt:ads"
        );
        assert_eq!(
            render_segment("{region}/{budgetTier}", Scenario::Prompt, None, &context),
            "unknown/premium"
        );
    }
}
