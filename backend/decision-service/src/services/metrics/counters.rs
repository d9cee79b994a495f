//! Prometheus counters for the decision pipeline (default registry)

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

static DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_decisions_total",
        "Recorded decisions by scenario, mode and fallback use",
        &["scenario", "mode", "fallback"]
    )
    .expect("Failed to register decisions metric")
});

static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "decision_pipeline_duration_seconds",
        "Rank request duration from pool lookup to recorded decision",
        &["scenario"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register pipeline duration metric")
});

static GATE_REMOVALS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_gate_removals_total",
        "Candidates removed by the constraint gate",
        &["reason"]
    )
    .expect("Failed to register gate removals metric")
});

static PERSISTENCE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_persistence_failures_total",
        "Store operations that failed after retries",
        &["operation"]
    )
    .expect("Failed to register persistence failures metric")
});

static FEEDBACK_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_feedback_events_total",
        "Events appended through feedback ingestion",
        &["event_type"]
    )
    .expect("Failed to register feedback events metric")
});

static ALERTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "decision_alerts_total",
        "Rolling-window threshold alerts raised",
        &["kind"]
    )
    .expect("Failed to register alerts metric")
});

pub struct DecisionMetrics;

impl DecisionMetrics {
    pub fn record_decision(scenario: &str, mode: &str, fallback_used: bool) {
        let fallback = if fallback_used { "true" } else { "false" };
        DECISIONS.with_label_values(&[scenario, mode, fallback]).inc();
    }

    pub fn observe_pipeline(scenario: &str, duration_secs: f64) {
        PIPELINE_DURATION
            .with_label_values(&[scenario])
            .observe(duration_secs);
    }

    pub fn record_gate_removal(reason: &str) {
        GATE_REMOVALS.with_label_values(&[reason]).inc();
    }

    pub fn record_persistence_failure(operation: &str) {
        PERSISTENCE_FAILURES.with_label_values(&[operation]).inc();
    }

    pub fn record_feedback_event(event_type: &str) {
        FEEDBACK_EVENTS.with_label_values(&[event_type]).inc();
    }

    pub fn record_alert(kind: &str) {
        ALERTS.with_label_values(&[kind]).inc();
    }
}
