use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a decision is about. Doubles as the candidate target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Model,
    Prompt,
    Style,
    Script,
    #[serde(alias = "content-element")]
    ContentElement,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Model,
        Scenario::Prompt,
        Scenario::Style,
        Scenario::Script,
        Scenario::ContentElement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Model => "model",
            Scenario::Prompt => "prompt",
            Scenario::Style => "style",
            Scenario::Script => "script",
            Scenario::ContentElement => "content_element",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "model" => Ok(Scenario::Model),
            "prompt" => Ok(Scenario::Prompt),
            "style" => Ok(Scenario::Style),
            "script" => Ok(Scenario::Script),
            "content_element" | "content-element" => Ok(Scenario::ContentElement),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

/// Execution capabilities and cost/latency estimates shared by every target type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub provider: Option<String>,
    pub json_mode: bool,
    pub tool_use: bool,
    pub safety_level: u8,
    pub est_cost_usd: f64,
    pub est_latency_ms: u64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            provider: None,
            json_mode: false,
            tool_use: false,
            safety_level: 0,
            est_cost_usd: 0.0,
            est_latency_ms: 0,
        }
    }
}

fn neutral_signal() -> f64 {
    0.5
}

/// Precomputed features consumed by the coarse and fine scorers, all in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringSignals {
    #[serde(default = "neutral_signal")]
    pub relevance: f64,
    #[serde(default = "neutral_signal")]
    pub quality: f64,
    #[serde(default = "neutral_signal")]
    pub diversity: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "neutral_signal")]
    pub user_preference: f64,
    #[serde(default = "neutral_signal")]
    pub business_value: f64,
    #[serde(default = "neutral_signal")]
    pub technical_quality: f64,
    #[serde(default = "neutral_signal")]
    pub market_trend: f64,
}

impl Default for ScoringSignals {
    fn default() -> Self {
        Self {
            relevance: 0.5,
            quality: 0.5,
            diversity: 0.5,
            updated_at: None,
            user_preference: 0.5,
            business_value: 0.5,
            technical_quality: 0.5,
            market_trend: 0.5,
        }
    }
}

impl ScoringSignals {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("relevance", self.relevance),
            ("quality", self.quality),
            ("diversity", self.diversity),
            ("userPreference", self.user_preference),
            ("businessValue", self.business_value),
            ("technicalQuality", self.technical_quality),
            ("marketTrend", self.market_trend),
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in self.named() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("signal {} out of range: {}", name, value));
            }
        }
        Ok(())
    }
}

/// Scenario-specific feature schema, tagged by target type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "targetType", rename_all = "snake_case")]
pub enum CandidateProfile {
    #[serde(rename_all = "camelCase")]
    Model {
        provider: String,
        model: String,
        #[serde(default)]
        context_window: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Prompt {
        template_key: String,
        #[serde(default = "first_version")]
        version: u32,
        #[serde(default)]
        language: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Style {
        style_key: String,
        #[serde(default)]
        palette: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Script {
        script_key: String,
        duration_secs: u32,
    },
    #[serde(rename_all = "camelCase", alias = "content-element")]
    ContentElement {
        element_kind: String,
        #[serde(default)]
        locale: Option<String>,
    },
}

fn first_version() -> u32 {
    1
}

impl CandidateProfile {
    pub fn target_type(&self) -> Scenario {
        match self {
            CandidateProfile::Model { .. } => Scenario::Model,
            CandidateProfile::Prompt { .. } => Scenario::Prompt,
            CandidateProfile::Style { .. } => Scenario::Style,
            CandidateProfile::Script { .. } => Scenario::Script,
            CandidateProfile::ContentElement { .. } => Scenario::ContentElement,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            CandidateProfile::Model {
                provider, model, ..
            } => {
                if provider.trim().is_empty() || model.trim().is_empty() {
                    return Err("model candidates need provider and model".to_string());
                }
            }
            CandidateProfile::Prompt {
                template_key,
                version,
                ..
            } => {
                if template_key.trim().is_empty() || *version == 0 {
                    return Err("prompt candidates need a template key and version >= 1".into());
                }
            }
            CandidateProfile::Style { style_key, .. } => {
                if style_key.trim().is_empty() {
                    return Err("style candidates need a style key".to_string());
                }
            }
            CandidateProfile::Script {
                script_key,
                duration_secs,
            } => {
                if script_key.trim().is_empty() || *duration_secs == 0 {
                    return Err("script candidates need a key and a positive duration".into());
                }
            }
            CandidateProfile::ContentElement { element_kind, .. } => {
                if element_kind.trim().is_empty() {
                    return Err("content elements need an element kind".to_string());
                }
            }
        }
        Ok(())
    }
}

/// A candidate as delivered by the candidate source, before any scoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub signals: ScoringSignals,
    pub profile: CandidateProfile,
}

impl RawCandidate {
    pub fn target_type(&self) -> Scenario {
        self.profile.target_type()
    }

    /// Provider this candidate executes on, if any
    pub fn provider(&self) -> Option<&str> {
        match (&self.capabilities.provider, &self.profile) {
            (Some(provider), _) => Some(provider.as_str()),
            (None, CandidateProfile::Model { provider, .. }) => Some(provider.as_str()),
            _ => None,
        }
    }

    /// Keys consulted in the circuit breaker registry: provider, then
    /// `provider/model` for model candidates
    pub fn breaker_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(provider) = self.provider() {
            keys.push(provider.to_string());
        }
        if let CandidateProfile::Model { provider, model, .. } = &self.profile {
            keys.push(format!("{}/{}", provider, model));
        }
        keys
    }

    /// Check the candidate against the schema of the scenario it was sourced for
    pub fn validate_for(&self, scenario: Scenario) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("candidate id is empty".to_string());
        }
        if self.target_type() != scenario {
            return Err(format!(
                "candidate {} is a {} but scenario is {}",
                self.id,
                self.target_type(),
                scenario
            ));
        }
        if !self.capabilities.est_cost_usd.is_finite() || self.capabilities.est_cost_usd < 0.0 {
            return Err(format!("candidate {} has an invalid cost estimate", self.id));
        }
        self.profile.validate()?;
        self.signals.validate()
    }
}

/// Which alternative slot a candidate occupies in a candidate set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    #[serde(rename = "top1")]
    Top1,
    #[serde(rename = "fineTop2")]
    FineTop2,
    /// Fine top-K ranks 3..K
    #[serde(rename = "fineTopK")]
    FineTopK,
    #[serde(rename = "coarse-extra")]
    CoarseExtra,
    #[serde(rename = "out-of-pool")]
    OutOfPool,
}

/// Structured explanation of how a candidate was scored
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateReason {
    pub coarse_factors: Vec<FactorContribution>,
    #[serde(default)]
    pub fine_factors: Vec<FactorContribution>,
    #[serde(default)]
    pub penalties: Vec<Penalty>,
    #[serde(default)]
    pub below_strict_floor: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FactorContribution {
    pub factor: String,
    pub value: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Penalty {
    pub kind: PenaltyKind,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    LatencySoft,
    CostOverrun,
    Diversity,
}

/// A candidate as frozen into a candidate set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub target_id: String,
    pub target_type: Scenario,
    pub coarse_score: f64,
    pub fine_score: Option<f64>,
    /// Score after gate penalties and diversity down-ranking
    pub final_score: f64,
    pub reason: CandidateReason,
    pub bucket: Bucket,
}

/// A raw candidate moving through the ranking pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub raw: RawCandidate,
    pub coarse_score: f64,
    pub fine_score: Option<f64>,
    /// Score the pipeline currently orders by; penalties multiply into it
    pub final_score: f64,
    pub reason: CandidateReason,
}

impl ScoredCandidate {
    /// Unscored entry, used for fallback and out-of-pool candidates
    pub fn unscored(raw: RawCandidate) -> Self {
        let reason = CandidateReason {
            category: raw.category.clone(),
            tags: raw.tags.clone(),
            provider: raw.provider().map(str::to_string),
            ..Default::default()
        };
        Self {
            raw,
            coarse_score: 0.0,
            fine_score: None,
            final_score: 0.0,
            reason,
        }
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }

    pub fn apply_penalty(&mut self, kind: PenaltyKind, multiplier: f64) {
        self.final_score *= multiplier;
        self.reason.penalties.push(Penalty { kind, multiplier });
    }

    pub fn to_candidate(&self, bucket: Bucket) -> Candidate {
        Candidate {
            target_id: self.raw.id.clone(),
            target_type: self.raw.target_type(),
            coarse_score: self.coarse_score,
            fine_score: self.fine_score,
            final_score: self.final_score,
            reason: self.reason.clone(),
            bucket,
        }
    }
}

/// Descending by score, ties broken by id ascending
pub fn by_score_then_id(a_score: f64, a_id: &str, b_score: f64, b_id: &str) -> std::cmp::Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_parsing_accepts_both_spellings() {
        assert_eq!("content-element".parse::<Scenario>().unwrap(), Scenario::ContentElement);
        assert_eq!("content_element".parse::<Scenario>().unwrap(), Scenario::ContentElement);
        assert_eq!(" Model ".parse::<Scenario>().unwrap(), Scenario::Model);
        assert!("video".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_profile_tagged_by_target_type() {
        let raw: RawCandidate = serde_json::from_value(json!({
            "id": "gpt-4o",
            "capabilities": {"jsonMode": true, "estCostUsd": 0.01},
            "profile": {"targetType": "model", "provider": "openai", "model": "gpt-4o"}
        }))
        .unwrap();

        assert_eq!(raw.target_type(), Scenario::Model);
        assert_eq!(raw.provider(), Some("openai"));
        assert_eq!(raw.breaker_keys(), vec!["openai", "openai/gpt-4o"]);
        assert_eq!(raw.signals.relevance, 0.5);
        assert!(raw.validate_for(Scenario::Model).is_ok());
        assert!(raw.validate_for(Scenario::Prompt).is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_signals() {
        let mut raw: RawCandidate = serde_json::from_value(json!({
            "id": "p1",
            "profile": {"targetType": "prompt", "templateKey": "promo"}
        }))
        .unwrap();
        assert!(raw.validate_for(Scenario::Prompt).is_ok());

        raw.signals.quality = 1.4;
        assert!(raw.validate_for(Scenario::Prompt).is_err());
    }

    #[test]
    fn test_bucket_wire_names() {
        assert_eq!(serde_json::to_value(Bucket::CoarseExtra).unwrap(), json!("coarse-extra"));
        assert_eq!(serde_json::to_value(Bucket::FineTop2).unwrap(), json!("fineTop2"));
        assert_eq!(serde_json::to_value(Bucket::OutOfPool).unwrap(), json!("out-of-pool"));
    }
}
