use anyhow::{anyhow, Result};
use resilience::CircuitBreakerConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub breaker: BreakerConfig,
    pub metrics: MetricsConfig,
    pub gate: GateConfig,
    pub exploration: ExplorationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub http_host: String,
    pub http_port: u16,
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// No URL means the in-process store
    pub url: Option<String>,
    pub max_connections: u32,
    pub record_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedisConfig {
    /// No URL means the in-process pool cache
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// JSON catalog: candidates and fallbacks per scenario, optional weight chains
    pub path: Option<String>,
    /// Age at which a candidate's recency signal halves
    pub recency_half_life_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub pool_ttl_secs: u64,
    pub decision_ttl_secs: u64,
    pub coarse_extras_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub cooldown_secs: u64,
    pub max_cooldown_secs: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub window_secs: u64,
    pub max_samples: usize,
    pub alert_explore_rate: f64,
    pub alert_fallback_rate: f64,
    pub alert_min_quality: f64,
    pub stats_window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub soft_penalty: f64,
    pub budget_economy_usd: f64,
    pub budget_standard_usd: f64,
    pub budget_premium_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorationConfig {
    pub diversity_penalty: f64,
    pub lookback: usize,
    pub lookback_secs: u64,
    pub weight_fine_top2: f64,
    pub weight_coarse_extra: f64,
    pub weight_out_of_pool: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8012,
            service_name: "decision-service".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            record_retries: 3,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            recency_half_life_hours: 72.0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_ttl_secs: 300,
            decision_ttl_secs: 600,
            coarse_extras_limit: 3,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            cooldown_secs: 30,
            max_cooldown_secs: 600,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            max_samples: 10_000,
            alert_explore_rate: 0.30,
            alert_fallback_rate: 0.20,
            alert_min_quality: 0.50,
            stats_window_hours: 24,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            soft_penalty: 0.8,
            budget_economy_usd: 0.002,
            budget_standard_usd: 0.01,
            budget_premium_usd: 0.05,
        }
    }
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            diversity_penalty: 0.3,
            lookback: 5,
            lookback_secs: 86_400,
            weight_fine_top2: 0.6,
            weight_coarse_extra: 0.25,
            weight_out_of_pool: 0.15,
        }
    }
}

impl BreakerConfig {
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_window: Duration::from_secs(self.failure_window_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            max_cooldown: Duration::from_secs(self.max_cooldown_secs),
            backoff_multiplier: self.backoff_multiplier,
            ..Default::default()
        }
    }
}

impl Config {
    /// Defaults first, then environment variables (`BREAKER__FAILURE_THRESHOLD=3`)
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let d = Config::default();

        let config = config::Config::builder()
            .set_default("service.http_host", d.service.http_host.clone())?
            .set_default("service.http_port", d.service.http_port as i64)?
            .set_default("service.service_name", d.service.service_name.clone())?
            .set_default("database.max_connections", d.database.max_connections as i64)?
            .set_default("database.record_retries", d.database.record_retries as i64)?
            .set_default("catalog.recency_half_life_hours", d.catalog.recency_half_life_hours)?
            .set_default("cache.pool_ttl_secs", d.cache.pool_ttl_secs as i64)?
            .set_default("cache.decision_ttl_secs", d.cache.decision_ttl_secs as i64)?
            .set_default("cache.coarse_extras_limit", d.cache.coarse_extras_limit as i64)?
            .set_default("breaker.failure_threshold", d.breaker.failure_threshold as i64)?
            .set_default("breaker.failure_window_secs", d.breaker.failure_window_secs as i64)?
            .set_default("breaker.cooldown_secs", d.breaker.cooldown_secs as i64)?
            .set_default("breaker.max_cooldown_secs", d.breaker.max_cooldown_secs as i64)?
            .set_default("breaker.backoff_multiplier", d.breaker.backoff_multiplier)?
            .set_default("metrics.window_secs", d.metrics.window_secs as i64)?
            .set_default("metrics.max_samples", d.metrics.max_samples as i64)?
            .set_default("metrics.alert_explore_rate", d.metrics.alert_explore_rate)?
            .set_default("metrics.alert_fallback_rate", d.metrics.alert_fallback_rate)?
            .set_default("metrics.alert_min_quality", d.metrics.alert_min_quality)?
            .set_default("metrics.stats_window_hours", d.metrics.stats_window_hours)?
            .set_default("gate.soft_penalty", d.gate.soft_penalty)?
            .set_default("gate.budget_economy_usd", d.gate.budget_economy_usd)?
            .set_default("gate.budget_standard_usd", d.gate.budget_standard_usd)?
            .set_default("gate.budget_premium_usd", d.gate.budget_premium_usd)?
            .set_default("exploration.diversity_penalty", d.exploration.diversity_penalty)?
            .set_default("exploration.lookback", d.exploration.lookback as i64)?
            .set_default("exploration.lookback_secs", d.exploration.lookback_secs as i64)?
            .set_default("exploration.weight_fine_top2", d.exploration.weight_fine_top2)?
            .set_default("exploration.weight_coarse_extra", d.exploration.weight_coarse_extra)?
            .set_default("exploration.weight_out_of_pool", d.exploration.weight_out_of_pool)?
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("Database max connections must be greater than 0"));
        }

        let half_life = self.catalog.recency_half_life_hours;
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(anyhow!("Recency half-life must be positive, got {}", half_life));
        }

        if self.cache.pool_ttl_secs == 0 || self.cache.decision_ttl_secs == 0 {
            return Err(anyhow!("Cache TTLs must be greater than 0"));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(anyhow!("Breaker failure threshold must be greater than 0"));
        }

        if self.breaker.backoff_multiplier < 1.0 {
            return Err(anyhow!("Breaker backoff multiplier must be >= 1.0"));
        }

        if self.breaker.max_cooldown_secs < self.breaker.cooldown_secs {
            return Err(anyhow!("Breaker max cooldown must be >= cooldown"));
        }

        if self.metrics.max_samples == 0 || self.metrics.window_secs == 0 {
            return Err(anyhow!("Metrics window and sample cap must be greater than 0"));
        }

        if self.metrics.stats_window_hours <= 0 {
            return Err(anyhow!("Decision stats window must be positive"));
        }

        let rates = [
            ("metrics.alert_explore_rate", self.metrics.alert_explore_rate),
            ("metrics.alert_fallback_rate", self.metrics.alert_fallback_rate),
            ("metrics.alert_min_quality", self.metrics.alert_min_quality),
            ("gate.soft_penalty", self.gate.soft_penalty),
            ("exploration.diversity_penalty", self.exploration.diversity_penalty),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }

        let pool_weights = [
            self.exploration.weight_fine_top2,
            self.exploration.weight_coarse_extra,
            self.exploration.weight_out_of_pool,
        ];
        if pool_weights.iter().any(|w| *w < 0.0) || pool_weights.iter().sum::<f64>() <= 0.0 {
            return Err(anyhow!("Exploration pool weights must be non-negative and not all zero"));
        }

        Ok(())
    }
}
