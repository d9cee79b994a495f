/// Resilience patterns for the decision service
///
/// - **Circuit Breaker**: per-dependency health state machine with windowed
///   failure counting and exponential cool-down backoff
/// - **Registry**: keyed breakers (one per provider or model) with
///   administrative reset/clear
/// - **Retry**: exponential backoff with jitter for transient failures
///
/// # Example: provider health tracking
///
/// ```rust
/// use resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
///
/// let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
///     failure_threshold: 2,
///     ..Default::default()
/// });
///
/// breakers.record_failure("openai");
/// breakers.record_failure("openai");
/// assert!(breakers.is_open("openai"));
///
/// breakers.clear_all();
/// assert!(!breakers.is_open("openai"));
/// ```
///
/// # Example: retrying a write
///
/// ```rust,no_run
/// use resilience::{with_retry, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry(RetryConfig::default(), || async {
///         // Your database write
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```

pub mod circuit_breaker;
pub mod metrics;
pub mod registry;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use registry::CircuitBreakerRegistry;
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
