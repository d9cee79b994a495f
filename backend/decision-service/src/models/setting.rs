use super::Scenario;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettingMode {
    #[default]
    Rule,
    Ml,
}

impl SettingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingMode::Rule => "rule",
            SettingMode::Ml => "ml",
        }
    }
}

pub const DEFAULT_SEGMENT_TEMPLATE: &str = "{scenario}:{category}";

/// Per-scenario tuning knobs for the ranking pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSetting {
    pub scenario: Scenario,
    pub mode: SettingMode,
    pub m_coarse: usize,
    pub k_fine: usize,
    pub epsilon: f64,
    pub min_explore: f64,
    pub diversity: bool,
    pub quality_floor_rej: f64,
    pub quality_floor_str: f64,
    pub cost_overrun_mul: f64,
    pub latency_soft_ms: u64,
    pub latency_hard_ms: u64,
    pub segment_template: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecommendationSetting {
    /// Documented defaults, used whenever a scenario has no stored row
    pub fn defaults(scenario: Scenario) -> Self {
        Self {
            scenario,
            mode: SettingMode::Rule,
            m_coarse: 10,
            k_fine: 3,
            epsilon: 0.10,
            min_explore: 0.05,
            diversity: false,
            quality_floor_rej: 0.20,
            quality_floor_str: 0.90,
            cost_overrun_mul: 1.50,
            latency_soft_ms: 6000,
            latency_hard_ms: 8000,
            segment_template: DEFAULT_SEGMENT_TEMPLATE.to_string(),
            updated_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.m_coarse == 0 {
            return Err("mCoarse must be at least 1".to_string());
        }
        if self.k_fine == 0 {
            return Err("kFine must be at least 1".to_string());
        }
        for (name, value) in [
            ("epsilon", self.epsilon),
            ("minExplore", self.min_explore),
            ("qualityFloorRej", self.quality_floor_rej),
            ("qualityFloorStr", self.quality_floor_str),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.quality_floor_rej > self.quality_floor_str {
            return Err("qualityFloorRej must not exceed qualityFloorStr".to_string());
        }
        if !self.cost_overrun_mul.is_finite() || self.cost_overrun_mul < 1.0 {
            return Err("costOverrunMul must be >= 1.0".to_string());
        }
        if self.latency_soft_ms > self.latency_hard_ms {
            return Err("latencySoftMs must not exceed latencyHardMs".to_string());
        }
        if self.segment_template.trim().is_empty() {
            return Err("segmentTemplate must not be empty".to_string());
        }
        Ok(())
    }

    pub fn apply(&mut self, update: SettingUpdate) {
        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(m_coarse) = update.m_coarse {
            self.m_coarse = m_coarse;
        }
        if let Some(k_fine) = update.k_fine {
            self.k_fine = k_fine;
        }
        if let Some(epsilon) = update.epsilon {
            self.epsilon = epsilon;
        }
        if let Some(min_explore) = update.min_explore {
            self.min_explore = min_explore;
        }
        if let Some(diversity) = update.diversity {
            self.diversity = diversity;
        }
        if let Some(floor) = update.quality_floor_rej {
            self.quality_floor_rej = floor;
        }
        if let Some(floor) = update.quality_floor_str {
            self.quality_floor_str = floor;
        }
        if let Some(mul) = update.cost_overrun_mul {
            self.cost_overrun_mul = mul;
        }
        if let Some(soft) = update.latency_soft_ms {
            self.latency_soft_ms = soft;
        }
        if let Some(hard) = update.latency_hard_ms {
            self.latency_hard_ms = hard;
        }
        if let Some(template) = update.segment_template {
            self.segment_template = template;
        }
    }
}

/// Partial upsert body; omitted fields keep their current (or default) value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingUpdate {
    pub mode: Option<SettingMode>,
    pub m_coarse: Option<usize>,
    pub k_fine: Option<usize>,
    pub epsilon: Option<f64>,
    pub min_explore: Option<f64>,
    pub diversity: Option<bool>,
    pub quality_floor_rej: Option<f64>,
    pub quality_floor_str: Option<f64>,
    pub cost_overrun_mul: Option<f64>,
    pub latency_soft_ms: Option<u64>,
    pub latency_hard_ms: Option<u64>,
    pub segment_template: Option<String>,
}
