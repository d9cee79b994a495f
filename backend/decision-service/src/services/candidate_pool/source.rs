use crate::models::{ContextSpec, RawCandidate, Scenario, TaskSpec};
use crate::services::weights::{CoarseWeights, FineWeights, WeightChain};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Candidate source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

/// Upstream provider of raw candidates for a scenario
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(
        &self,
        scenario: Scenario,
        task: Option<&TaskSpec>,
        context: &ContextSpec,
    ) -> Result<Vec<RawCandidate>, SourceError>;
}

/// Weight chains shipped with a catalog
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogWeights {
    pub coarse: WeightChain<CoarseWeights>,
    pub fine: WeightChain<FineWeights>,
}

/// On-disk catalog: candidates and fallbacks per scenario, optional weights
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    pub candidates: HashMap<Scenario, Vec<RawCandidate>>,
    pub fallbacks: HashMap<Scenario, RawCandidate>,
    pub weights: CatalogWeights,
}

impl CatalogFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SourceError::InvalidCatalog(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        serde_json::from_str(raw).map_err(|e| SourceError::InvalidCatalog(e.to_string()))
    }
}

/// Candidate source backed by an in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCandidateSource {
    by_scenario: HashMap<Scenario, Vec<RawCandidate>>,
}

impl StaticCandidateSource {
    pub fn new(by_scenario: HashMap<Scenario, Vec<RawCandidate>>) -> Self {
        Self { by_scenario }
    }

    pub fn with_candidates(mut self, scenario: Scenario, candidates: Vec<RawCandidate>) -> Self {
        self.by_scenario.insert(scenario, candidates);
        self
    }
}

#[async_trait::async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn fetch(
        &self,
        scenario: Scenario,
        _task: Option<&TaskSpec>,
        _context: &ContextSpec,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(self.by_scenario.get(&scenario).cloned().unwrap_or_default())
    }
}
