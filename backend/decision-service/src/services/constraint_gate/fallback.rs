use crate::models::{CandidateProfile, Capabilities, RawCandidate, Scenario, ScoringSignals, TaskSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies a single out-of-pool candidate for a scenario. Used when the
/// gate empties the pool, and as the out-of-pool exploration option.
pub trait FallbackCandidateProvider: Send + Sync {
    fn fallback(&self, scenario: Scenario, task: Option<&TaskSpec>) -> Option<RawCandidate>;
}

/// Always returns the same candidate
#[derive(Debug, Clone)]
pub struct StaticFallback {
    candidate: RawCandidate,
}

impl StaticFallback {
    pub fn new(candidate: RawCandidate) -> Self {
        Self { candidate }
    }
}

impl FallbackCandidateProvider for StaticFallback {
    fn fallback(&self, scenario: Scenario, _task: Option<&TaskSpec>) -> Option<RawCandidate> {
        (self.candidate.target_type() == scenario).then(|| self.candidate.clone())
    }
}

/// Per-scenario fallback providers
#[derive(Clone, Default)]
pub struct FallbackRegistry {
    providers: HashMap<Scenario, Arc<dyn FallbackCandidateProvider>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a conservative built-in candidate for every scenario
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for scenario in Scenario::ALL {
            registry.register(scenario, Arc::new(StaticFallback::new(default_fallback(scenario))));
        }
        registry
    }

    pub fn register(&mut self, scenario: Scenario, provider: Arc<dyn FallbackCandidateProvider>) {
        self.providers.insert(scenario, provider);
    }

    pub fn fallback(&self, scenario: Scenario, task: Option<&TaskSpec>) -> Option<RawCandidate> {
        self.providers
            .get(&scenario)
            .and_then(|p| p.fallback(scenario, task))
    }
}

fn default_fallback(scenario: Scenario) -> RawCandidate {
    let (id, profile, provider) = match scenario {
        Scenario::Model => (
            "fallback-model",
            CandidateProfile::Model {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                context_window: Some(128_000),
            },
            Some("openai".to_string()),
        ),
        Scenario::Prompt => (
            "fallback-prompt",
            CandidateProfile::Prompt {
                template_key: "default".to_string(),
                version: 1,
                language: None,
            },
            None,
        ),
        Scenario::Style => (
            "fallback-style",
            CandidateProfile::Style {
                style_key: "neutral".to_string(),
                palette: Vec::new(),
            },
            None,
        ),
        Scenario::Script => (
            "fallback-script",
            CandidateProfile::Script {
                script_key: "generic-30s".to_string(),
                duration_secs: 30,
            },
            None,
        ),
        Scenario::ContentElement => (
            "fallback-content-element",
            CandidateProfile::ContentElement {
                element_kind: "text".to_string(),
                locale: None,
            },
            None,
        ),
    };

    RawCandidate {
        id: id.to_string(),
        category: None,
        tags: vec!["fallback".to_string()],
        capabilities: Capabilities {
            provider,
            ..Default::default()
        },
        signals: ScoringSignals::default(),
        profile,
    }
}
