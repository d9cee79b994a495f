/// Keyed circuit breakers, one per provider or model identifier
///
/// Breakers are created lazily on the first recorded outcome. Reads never
/// create entries, so `is_open` on an unknown key is simply `false`.
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    fn breaker(&self, key: &str) -> CircuitBreaker {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::with_key(key, self.config.clone()))
            .clone()
    }

    pub fn record_success(&self, key: &str) -> CircuitState {
        self.breaker(key).record_success()
    }

    pub fn record_failure(&self, key: &str) -> CircuitState {
        self.breaker(key).record_failure()
    }

    /// Pure read: unknown keys are closed
    pub fn is_open(&self, key: &str) -> bool {
        self.breakers
            .get(key)
            .map(|breaker| breaker.is_open())
            .unwrap_or(false)
    }

    pub fn state(&self, key: &str) -> CircuitState {
        self.breakers
            .get(key)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Returns false when the key was never seen
    pub fn reset(&self, key: &str) -> bool {
        match self.breakers.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every known key to closed with zero failures; returns how many
    /// were not closed beforehand
    pub fn clear_all(&self) -> usize {
        let mut reopened = 0;
        for entry in self.breakers.iter() {
            if entry.value().state() != CircuitState::Closed {
                reopened += 1;
            }
            entry.value().reset();
        }
        info!(
            keys = self.breakers.len(),
            not_closed = reopened,
            "All circuit breakers cleared"
        );
        reopened
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(threshold: u32) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(40),
            ..Default::default()
        })
    }

    #[test]
    fn test_unknown_key_is_closed_and_not_created() {
        let registry = registry(3);

        assert!(!registry.is_open("never-seen"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_keys_are_isolated() {
        let registry = registry(2);
        registry.record_failure("openai");
        registry.record_failure("openai");
        registry.record_failure("anthropic");

        assert!(registry.is_open("openai"));
        assert!(!registry.is_open("anthropic"));
    }

    #[test]
    fn test_clear_all_resets_open_keys() {
        let registry = registry(1);
        registry.record_failure("openai");
        registry.record_failure("stability");
        registry.record_success("anthropic");

        assert_eq!(registry.clear_all(), 2);

        for snapshot in registry.snapshot() {
            assert_eq!(snapshot.state, CircuitState::Closed);
            assert_eq!(snapshot.consecutive_failures, 0);
        }
        assert!(!registry.is_open("openai"));
        assert!(!registry.is_open("stability"));
    }

    #[test]
    fn test_concurrent_failures_open_exactly_once() {
        let registry = registry(8);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.record_failure("openai"))
            })
            .collect();

        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|state| *state == CircuitState::Open)
            .count();

        // Only the last failure observes the Closed → Open edge
        assert_eq!(opened, 1);
        assert!(registry.is_open("openai"));
    }
}
