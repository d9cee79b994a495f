use super::DecisionMetrics;
use crate::models::{Decision, DecisionMode, Outcome, Scenario};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Segment label of the whole-window row in the CSV export
pub const ALL_SEGMENTS: &str = "__all__";

#[derive(Debug, Clone)]
pub struct MetricsSample {
    pub decision_id: Uuid,
    pub scenario: Scenario,
    pub segment: String,
    pub explored: bool,
    pub fallback_used: bool,
    pub quality: Option<f64>,
    pub latency_ms: Option<u64>,
    pub cost: Option<f64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    /// Alert when explore rate rises above this
    pub explore_rate: f64,
    /// Alert when fallback rate rises above this
    pub fallback_rate: f64,
    /// Alert when average quality drops below this
    pub min_quality: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            explore_rate: 0.30,
            fallback_rate: 0.20,
            min_quality: 0.50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub window_secs: i64,
    pub total: u64,
    pub explore_count: u64,
    pub fallback_count: u64,
    pub explore_rate: f64,
    pub fallback_rate: f64,
    pub avg_quality: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub avg_cost: Option<f64>,
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetrics {
    pub segment: String,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ExploreRate,
    FallbackRate,
    Quality,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ExploreRate => "explore_rate",
            AlertKind::FallbackRate => "fallback_rate",
            AlertKind::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    samples: VecDeque<MetricsSample>,
    last_alert: Option<Alert>,
}

/// Rolling window over recent decisions, oldest sample first
#[derive(Clone)]
pub struct MetricsAggregator {
    state: Arc<RwLock<State>>,
    window: Duration,
    max_samples: usize,
    thresholds: AlertThresholds,
}

impl MetricsAggregator {
    pub fn new(window: Duration, max_samples: usize, thresholds: AlertThresholds) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            window,
            max_samples: max_samples.max(1),
            thresholds,
        }
    }

    pub fn record_decision(&self, decision: &Decision) {
        let sample = MetricsSample {
            decision_id: decision.id,
            scenario: decision.scenario,
            segment: decision.segment.clone(),
            explored: decision.mode == DecisionMode::Explore,
            fallback_used: decision.fallback_used(),
            quality: None,
            latency_ms: None,
            cost: None,
            at: decision.created_at,
        };

        let mut state = self.state.write();
        state.samples.push_back(sample);
        while state.samples.len() > self.max_samples {
            state.samples.pop_front();
        }
    }

    /// Attach measured values to the decision's sample, if still in the window
    pub fn record_outcome(&self, outcome: &Outcome) -> bool {
        let mut state = self.state.write();
        match state
            .samples
            .iter_mut()
            .rev()
            .find(|s| s.decision_id == outcome.decision_id)
        {
            Some(sample) => {
                sample.quality = outcome.quality_score;
                sample.latency_ms = outcome.latency_ms;
                sample.cost = outcome.cost_actual;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let state = self.state.read();
        let live: Vec<&MetricsSample> = self.live(&state, now).collect();
        self.summarize(&live, now)
    }

    /// One row per segment, sorted by segment name
    pub fn segments(&self, now: DateTime<Utc>) -> Vec<SegmentMetrics> {
        let state = self.state.read();
        let mut groups: BTreeMap<&str, Vec<&MetricsSample>> = BTreeMap::new();
        for sample in self.live(&state, now) {
            groups.entry(sample.segment.as_str()).or_default().push(sample);
        }

        groups
            .into_iter()
            .map(|(segment, samples)| SegmentMetrics {
                segment: segment.to_string(),
                metrics: self.summarize(&samples, now),
            })
            .collect()
    }

    pub fn to_csv(&self, now: DateTime<Utc>) -> String {
        let mut rows = self.segments(now);
        rows.push(SegmentMetrics {
            segment: ALL_SEGMENTS.to_string(),
            metrics: self.snapshot(now),
        });

        let mut out = String::from(
            "segment,total,explore_count,fallback_count,explore_rate,fallback_rate,avg_quality,avg_latency_ms,avg_cost\n",
        );
        let opt = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_default();
        for row in rows {
            let m = &row.metrics;
            let _ = writeln!(
                out,
                "{},{},{},{},{:.4},{:.4},{},{},{}",
                csv_field(&row.segment),
                m.total,
                m.explore_count,
                m.fallback_count,
                m.explore_rate,
                m.fallback_rate,
                opt(m.avg_quality),
                opt(m.avg_latency_ms),
                opt(m.avg_cost),
            );
        }
        out
    }

    /// Evaluate thresholds against the current window. The first crossed
    /// threshold becomes the last alert.
    pub fn should_alert(&self, now: DateTime<Utc>) -> bool {
        let snapshot = self.snapshot(now);
        if snapshot.total == 0 {
            return false;
        }

        let t = self.thresholds;
        let alert = if snapshot.explore_rate > t.explore_rate {
            Some((AlertKind::ExploreRate, snapshot.explore_rate, t.explore_rate))
        } else if snapshot.fallback_rate > t.fallback_rate {
            Some((AlertKind::FallbackRate, snapshot.fallback_rate, t.fallback_rate))
        } else {
            snapshot
                .avg_quality
                .filter(|q| *q < t.min_quality)
                .map(|q| (AlertKind::Quality, q, t.min_quality))
        };

        match alert {
            Some((kind, value, threshold)) => {
                warn!(kind = kind.as_str(), value, threshold, "Decision metrics alert");
                DecisionMetrics::record_alert(kind.as_str());
                self.state.write().last_alert = Some(Alert {
                    kind,
                    value,
                    threshold,
                    at: now,
                });
                true
            }
            None => false,
        }
    }

    pub fn last_alert(&self) -> Option<Alert> {
        self.state.read().last_alert.clone()
    }

    fn live<'a>(
        &self,
        state: &'a State,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a MetricsSample> {
        let cutoff = now - self.window;
        state.samples.iter().filter(move |s| s.at >= cutoff)
    }

    fn summarize(&self, samples: &[&MetricsSample], now: DateTime<Utc>) -> MetricsSnapshot {
        let total = samples.len() as u64;
        let explore_count = samples.iter().filter(|s| s.explored).count() as u64;
        let fallback_count = samples.iter().filter(|s| s.fallback_used).count() as u64;
        let rate = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        MetricsSnapshot {
            window_secs: self.window.num_seconds(),
            total,
            explore_count,
            fallback_count,
            explore_rate: rate(explore_count),
            fallback_rate: rate(fallback_count),
            avg_quality: mean(samples.iter().filter_map(|s| s.quality)),
            avg_latency_ms: mean(samples.iter().filter_map(|s| s.latency_ms.map(|v| v as f64))),
            avg_cost: mean(samples.iter().filter_map(|s| s.cost)),
            computed_at: Some(now),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExploreFlags, SettingMode, WeightsSnapshot};
    use crate::services::weights::{CoarseWeights, FineWeights};

    fn decision(segment: &str, mode: DecisionMode, fallback: bool, at: DateTime<Utc>) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            candidate_set_id: Uuid::new_v4(),
            scenario: Scenario::Model,
            subject_ref: "job".into(),
            chosen_target_id: "a".into(),
            mode,
            weights_snapshot: WeightsSnapshot {
                coarse: CoarseWeights::default(),
                fine: FineWeights::default(),
                weight_levels: vec!["global".into()],
                m_coarse: 10,
                k_fine: 3,
                top_k: 3,
                epsilon: 0.1,
                min_explore: 0.05,
                diversity: false,
                requested_mode: SettingMode::Rule,
                strategy: "rule".into(),
                strategy_version: None,
                fallback_used: fallback,
                fallback_unhealthy: false,
                gate_report: Vec::new(),
                pool_fingerprint: "fp".into(),
                pool_cache_hit: false,
            },
            explore_flags: ExploreFlags::default(),
            request_id: None,
            segment: segment.into(),
            created_at: at,
        }
    }

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(Duration::hours(1), 100, AlertThresholds::default())
    }

    #[test]
    fn test_snapshot_rates_and_window() {
        let agg = aggregator();
        let now = Utc::now();
        agg.record_decision(&decision("model:ads", DecisionMode::Explore, false, now));
        agg.record_decision(&decision("model:ads", DecisionMode::Exploit, true, now));
        agg.record_decision(&decision("model:ads", DecisionMode::Exploit, false, now));
        agg.record_decision(&decision("model:ads", DecisionMode::Exploit, false, now));
        // outside the window
        agg.record_decision(&decision("model:ads", DecisionMode::Explore, true, now - Duration::hours(2)));

        let snap = agg.snapshot(now);
        assert_eq!(snap.total, 4);
        assert_eq!(snap.explore_rate, 0.25);
        assert_eq!(snap.fallback_rate, 0.25);
        assert!(snap.avg_quality.is_none());
    }

    #[test]
    fn test_outcome_feeds_averages() {
        let agg = aggregator();
        let now = Utc::now();
        let d = decision("model:ads", DecisionMode::Exploit, false, now);
        agg.record_decision(&d);

        let mut outcome = Outcome::empty(d.id, now);
        outcome.quality_score = Some(0.8);
        outcome.latency_ms = Some(1200);
        assert!(agg.record_outcome(&outcome));
        assert!(!agg.record_outcome(&Outcome::empty(Uuid::new_v4(), now)));

        let snap = agg.snapshot(now);
        assert_eq!(snap.avg_quality, Some(0.8));
        assert_eq!(snap.avg_latency_ms, Some(1200.0));
    }

    #[test]
    fn test_segments_and_csv() {
        let agg = aggregator();
        let now = Utc::now();
        agg.record_decision(&decision("model:ads", DecisionMode::Exploit, false, now));
        agg.record_decision(&decision("model:blog", DecisionMode::Explore, false, now));

        let segments = agg.segments(now);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment, "model:ads");

        let csv = agg.to_csv(now);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("segment,total"));
        assert!(lines[3].starts_with("__all__,2,1,0,0.5000"));
    }

    #[test]
    fn test_alert_on_high_fallback_rate() {
        let agg = aggregator();
        let now = Utc::now();
        assert!(!agg.should_alert(now));

        agg.record_decision(&decision("s", DecisionMode::Exploit, true, now));
        agg.record_decision(&decision("s", DecisionMode::Exploit, false, now));

        assert!(agg.should_alert(now));
        let alert = agg.last_alert().unwrap();
        assert_eq!(alert.kind, AlertKind::FallbackRate);
        assert_eq!(alert.value, 0.5);
    }

    #[test]
    fn test_sample_cap_drops_oldest() {
        let agg = MetricsAggregator::new(Duration::hours(1), 2, AlertThresholds::default());
        let now = Utc::now();
        for _ in 0..5 {
            agg.record_decision(&decision("s", DecisionMode::Exploit, false, now));
        }
        assert_eq!(agg.snapshot(now).total, 2);
    }
}
