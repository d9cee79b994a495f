//! Wires configuration and backends into handler state

use crate::cache::{InMemoryTtlCache, TtlCache};
use crate::config::Config;
use crate::handlers::AppState;
use crate::services::candidate_pool::{
    CandidatePoolCache, CandidateSource, CatalogFile, CatalogWeights, StaticCandidateSource,
};
use crate::services::coarse_ranking::CoarseRankingLayer;
use crate::services::constraint_gate::{
    ConstraintGate, FallbackRegistry, GatePolicy, StaticFallback, TierBudgets,
};
use crate::services::decision_engine::{DecisionEngine, EngineParts};
use crate::services::decision_recorder::DecisionRecorder;
use crate::services::exploration::{
    DiversityPenalty, ExplorationPolicy, PoolWeights, RecentChoiceLog,
};
use crate::services::feedback::FeedbackIngestor;
use crate::services::fine_ranking::FineRankingLayer;
use crate::services::metrics::{AlertThresholds, MetricsAggregator};
use crate::services::settings::SettingsService;
use crate::store::{DecisionStore, InMemoryStore, SettingsStore};
use rand::rngs::StdRng;
use resilience::{CircuitBreakerRegistry, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// Backends and catalog data the engine is built on
pub struct Wiring {
    pub decision_store: Arc<dyn DecisionStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub pool_cache: Arc<dyn TtlCache>,
    pub decision_cache: Arc<dyn TtlCache>,
    pub source: Arc<dyn CandidateSource>,
    pub fallbacks: FallbackRegistry,
    pub weights: CatalogWeights,
    pub breakers: CircuitBreakerRegistry,
    pub rng: Option<StdRng>,
}

impl Wiring {
    /// Everything in-process, candidates and fallbacks from the catalog
    pub fn in_memory(config: &Config, catalog: CatalogFile) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryTtlCache::new());
        Self::with_backends(config, catalog, store.clone(), store, cache.clone(), cache)
    }

    pub fn with_backends(
        config: &Config,
        catalog: CatalogFile,
        decision_store: Arc<dyn DecisionStore>,
        settings_store: Arc<dyn SettingsStore>,
        pool_cache: Arc<dyn TtlCache>,
        decision_cache: Arc<dyn TtlCache>,
    ) -> Self {
        let mut fallbacks = FallbackRegistry::with_defaults();
        for (scenario, candidate) in catalog.fallbacks {
            fallbacks.register(scenario, Arc::new(StaticFallback::new(candidate)));
        }

        Self {
            decision_store,
            settings_store,
            pool_cache,
            decision_cache,
            source: Arc::new(StaticCandidateSource::new(catalog.candidates)),
            fallbacks,
            weights: catalog.weights,
            breakers: CircuitBreakerRegistry::new(config.breaker.to_circuit_breaker_config()),
            rng: None,
        }
    }
}

pub fn build_state(config: &Config, wiring: Wiring) -> AppState {
    let metrics = MetricsAggregator::new(
        chrono::Duration::seconds(config.metrics.window_secs as i64),
        config.metrics.max_samples,
        AlertThresholds {
            explore_rate: config.metrics.alert_explore_rate,
            fallback_rate: config.metrics.alert_fallback_rate,
            min_quality: config.metrics.alert_min_quality,
        },
    );

    let gate = ConstraintGate::new(
        GatePolicy {
            soft_penalty: config.gate.soft_penalty,
            budgets: TierBudgets {
                economy: config.gate.budget_economy_usd,
                standard: config.gate.budget_standard_usd,
                premium: config.gate.budget_premium_usd,
            },
        },
        Arc::new(wiring.breakers.clone()),
        Arc::new(wiring.fallbacks),
    );

    let exploration = ExplorationPolicy::new(PoolWeights {
        fine_top2: config.exploration.weight_fine_top2,
        coarse_extra: config.exploration.weight_coarse_extra,
        out_of_pool: config.exploration.weight_out_of_pool,
    });

    let recorder = DecisionRecorder::new(
        wiring.decision_store.clone(),
        RetryConfig {
            max_retries: config.database.record_retries,
            ..Default::default()
        },
    );

    let settings = SettingsService::new(wiring.settings_store);

    let engine = DecisionEngine::new(EngineParts {
        pool: CandidatePoolCache::new(
            wiring.pool_cache,
            wiring.source,
            Duration::from_secs(config.cache.pool_ttl_secs),
        ),
        weights: wiring.weights,
        coarse: CoarseRankingLayer::new(config.cache.coarse_extras_limit)
            .with_half_life(config.catalog.recency_half_life_hours),
        fine: FineRankingLayer::new(),
        gate,
        exploration,
        diversity: DiversityPenalty::new(config.exploration.diversity_penalty),
        recent: RecentChoiceLog::new(
            config.exploration.lookback,
            chrono::Duration::seconds(config.exploration.lookback_secs as i64),
        ),
        settings: settings.clone(),
        recorder,
        store: wiring.decision_store.clone(),
        decision_cache: wiring.decision_cache,
        decision_ttl: Duration::from_secs(config.cache.decision_ttl_secs),
        metrics: metrics.clone(),
        rng: wiring.rng,
    });

    AppState {
        engine: Arc::new(engine),
        feedback: FeedbackIngestor::new(wiring.decision_store, metrics),
        settings,
        breakers: wiring.breakers,
        stats_window_hours: config.metrics.stats_window_hours,
    }
}
