//! Cache key schema
//!
//! Key format: v{VERSION}:{entity}:{scenario}:{identifier}

use crate::models::Scenario;

/// Bump when the cached payload shape changes
pub const CACHE_VERSION: u32 = 1;

pub struct CacheKey;

impl CacheKey {
    /// Format: v1:pool:{scenario}:{fingerprint}
    pub fn pool(scenario: Scenario, fingerprint: &str) -> String {
        format!("v{}:pool:{}:{}", CACHE_VERSION, scenario, fingerprint)
    }

    pub fn pool_prefix() -> String {
        format!("v{}:pool:", CACHE_VERSION)
    }

    /// Format: v1:decision:{scenario}:{request_id}
    pub fn decision(scenario: Scenario, request_id: &str) -> String {
        format!("v{}:decision:{}:{}", CACHE_VERSION, scenario, request_id)
    }

    pub fn decision_prefix() -> String {
        format!("v{}:decision:", CACHE_VERSION)
    }
}
