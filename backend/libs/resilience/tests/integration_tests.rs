/// Integration tests for resilience library
use resilience::{
    circuit_breaker::{CircuitBreakerConfig, CircuitState},
    retry::{with_retry_if, RetryConfig, RetryError},
    CircuitBreakerRegistry,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ==================== Circuit Breaker Tests ====================

fn provider_registry() -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_millis(60),
        ..Default::default()
    })
}

#[test]
fn test_breaker_full_lifecycle() {
    let breakers = provider_registry();

    // Phase 1: Closed -> Open (3 failures)
    for _ in 0..3 {
        breakers.record_failure("openai/gpt-4o");
    }
    assert!(breakers.is_open("openai/gpt-4o"));

    // Phase 2: Open -> HalfOpen (cool-down elapses, no call needed)
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(breakers.state("openai/gpt-4o"), CircuitState::HalfOpen);
    assert!(!breakers.is_open("openai/gpt-4o"));

    // Phase 3: HalfOpen -> Closed (one success)
    breakers.record_success("openai/gpt-4o");
    assert_eq!(breakers.state("openai/gpt-4o"), CircuitState::Closed);
}

#[test]
fn test_halfopen_failure_reopens() {
    let breakers = provider_registry();
    for _ in 0..3 {
        breakers.record_failure("stability");
    }
    std::thread::sleep(Duration::from_millis(80));

    breakers.record_failure("stability");

    assert!(breakers.is_open("stability"));
    let snapshot = breakers
        .snapshot()
        .into_iter()
        .find(|s| s.key == "stability")
        .expect("snapshot for stability");
    assert_eq!(snapshot.cooldown_ms, 120);
    assert!(snapshot.next_retry_at.is_some());
}

#[test]
fn test_clear_all_then_reads_are_closed() {
    let breakers = provider_registry();
    for key in ["a", "b", "c"] {
        for _ in 0..3 {
            breakers.record_failure(key);
        }
    }

    breakers.clear_all();

    for key in ["a", "b", "c"] {
        assert!(!breakers.is_open(key));
    }
    assert!(breakers
        .snapshot()
        .iter()
        .all(|s| s.consecutive_failures == 0 && s.state == CircuitState::Closed));
}

#[test]
fn test_clear_all_concurrent_with_reads() {
    let breakers = provider_registry();
    for _ in 0..3 {
        breakers.record_failure("openai");
    }

    let reader = {
        let breakers = breakers.clone();
        std::thread::spawn(move || {
            for _ in 0..1000 {
                let _ = breakers.is_open("openai");
            }
        })
    };
    breakers.clear_all();
    reader.join().unwrap();

    assert!(!breakers.is_open("openai"));
}

// ==================== Retry Tests ====================

#[tokio::test]
async fn test_retry_transient_then_success() {
    let config = RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    };
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        config,
        |e: &String| e.starts_with("transient"),
        move || {
            let attempt = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err("transient: connection reset".to_string())
                } else {
                    Ok("recorded")
                }
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), "recorded");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_error_into_inner() {
    let config = RetryConfig {
        max_retries: 1,
        initial_backoff: Duration::from_millis(1),
        jitter: false,
        ..Default::default()
    };

    let result = with_retry_if(config, |_: &String| true, || async {
        Err::<(), _>("pool timed out".to_string())
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, RetryError::MaxRetriesExceeded { .. }));
    assert_eq!(err.into_inner(), "pool timed out");
}
