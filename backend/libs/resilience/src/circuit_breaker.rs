/// Circuit Breaker for a single dependency (provider or model)
///
/// State transitions:
/// - Closed → Open: `failure_threshold` consecutive failures inside `failure_window`,
///   or (optionally) the sliding-window error rate crossing `error_rate_threshold`
/// - Open → HalfOpen: automatically once the current cool-down has elapsed
/// - HalfOpen → Closed: on the next success (`success_threshold`, default 1)
/// - HalfOpen → Open: on the next failure, with the cool-down multiplied by
///   `backoff_multiplier` (capped at `max_cooldown`)
///
/// All transitions happen under one write lock per breaker, so two concurrent
/// failures cannot both observe the Closed → Open edge.
use crate::metrics::CircuitBreakerMetrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Dependency considered unhealthy, callers should skip it
    Open,
    /// Cool-down elapsed, the next outcome decides
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failure count to trigger circuit open
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward `failure_threshold`
    pub failure_window: Duration,
    /// Success count in HalfOpen to close circuit
    pub success_threshold: u32,
    /// Initial cool-down before Open → HalfOpen
    pub cooldown: Duration,
    /// Upper bound for the backed-off cool-down
    pub max_cooldown: Duration,
    /// Cool-down multiplier applied on every reopen from HalfOpen
    pub backoff_multiplier: f64,
    /// Optional error rate threshold (0.0 - 1.0) over the sliding window
    pub error_rate_threshold: Option<f64>,
    /// Sliding window size for error rate calculation
    pub window_size: usize,
    /// Minimum calls in the window before the error rate is considered
    pub min_calls_for_rate: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            success_threshold: 1,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(600),
            backoff_multiplier: 2.0,
            error_rate_threshold: None,
            window_size: 100,
            min_calls_for_rate: 20,
        }
    }
}

/// Point-in-time view of one breaker, for admin listings
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub cooldown_ms: u64,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    key: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    current: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Timestamps of the current failure streak
    failure_streak: VecDeque<Instant>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    last_failure_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    /// Sliding window: true = success, false = failure
    window: VecDeque<bool>,
}

impl CircuitBreakerState {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            current: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_streak: VecDeque::new(),
            opened_at: None,
            cooldown: config.cooldown,
            last_failure_at: None,
            next_retry_at: None,
            window: VecDeque::with_capacity(config.window_size),
        }
    }

    /// State as observed at `now`, without mutating anything
    fn effective(&self, now: Instant) -> CircuitState {
        match (self.current, self.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if now.saturating_duration_since(opened_at) >= self.cooldown =>
            {
                CircuitState::HalfOpen
            }
            (current, _) => current,
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_key("default", config)
    }

    pub fn with_key(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let key: String = key.into();
        Self {
            key: Arc::from(key),
            state: Arc::new(RwLock::new(CircuitBreakerState::new(&config))),
            config,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True while the breaker is open and its cool-down has not elapsed.
    /// Read-only; never transitions state.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn record_success(&self) -> CircuitState {
        let now = Instant::now();
        let mut state = self.state.write();
        let effective = state.effective(now);

        state.consecutive_successes += 1;
        state.consecutive_failures = 0;
        state.failure_streak.clear();
        self.add_to_window(&mut state, true);

        match effective {
            CircuitState::HalfOpen
                if state.consecutive_successes >= self.config.success_threshold =>
            {
                info!(key = %self.key, "Circuit breaker: HalfOpen → Closed");
                CircuitBreakerMetrics::record_state_transition("half_open", "closed");
                if let Some(opened_at) = state.opened_at {
                    CircuitBreakerMetrics::record_open_duration(
                        now.saturating_duration_since(opened_at).as_secs_f64(),
                    );
                }
                state.current = CircuitState::Closed;
                state.opened_at = None;
                state.next_retry_at = None;
                state.cooldown = self.config.cooldown;
            }
            CircuitState::HalfOpen => {
                state.current = CircuitState::HalfOpen;
            }
            _ => {}
        }

        CircuitBreakerMetrics::record_call(effective.as_str(), "success");
        state.current
    }

    pub fn record_failure(&self) -> CircuitState {
        let now = Instant::now();
        let mut state = self.state.write();
        let effective = state.effective(now);

        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        state.last_failure_at = Some(Utc::now());
        state.failure_streak.push_back(now);
        while let Some(front) = state.failure_streak.front() {
            if now.saturating_duration_since(*front) > self.config.failure_window {
                state.failure_streak.pop_front();
            } else {
                break;
            }
        }
        self.add_to_window(&mut state, false);

        match effective {
            CircuitState::Closed => {
                let streak = state.failure_streak.len() as u32;
                let error_rate = self.calculate_error_rate(&state);
                let rate_tripped = self
                    .config
                    .error_rate_threshold
                    .map(|threshold| {
                        state.window.len() >= self.config.min_calls_for_rate
                            && error_rate >= threshold
                    })
                    .unwrap_or(false);

                if streak >= self.config.failure_threshold || rate_tripped {
                    warn!(
                        key = %self.key,
                        failures = streak,
                        error_rate = error_rate,
                        "Circuit breaker: Closed → Open"
                    );
                    CircuitBreakerMetrics::record_state_transition("closed", "open");
                    self.open(&mut state, now);
                }
            }
            CircuitState::HalfOpen => {
                let backed_off = state.cooldown.mul_f64(self.config.backoff_multiplier.max(1.0));
                state.cooldown = backed_off.min(self.config.max_cooldown);
                warn!(
                    key = %self.key,
                    cooldown_ms = state.cooldown.as_millis() as u64,
                    "Circuit breaker: HalfOpen → Open (probe failed)"
                );
                CircuitBreakerMetrics::record_state_transition("half_open", "open");
                self.open(&mut state, now);
            }
            CircuitState::Open => {
                // Already open, nothing to do
            }
        }

        CircuitBreakerMetrics::record_call(effective.as_str(), "failure");
        state.current
    }

    /// Force the breaker back to Closed with zero failures
    pub fn reset(&self) {
        let mut state = self.state.write();
        if state.current != CircuitState::Closed {
            info!(key = %self.key, from = state.current.as_str(), "Circuit breaker reset");
        }
        *state = CircuitBreakerState::new(&self.config);
    }

    fn open(&self, state: &mut CircuitBreakerState, now: Instant) {
        state.current = CircuitState::Open;
        state.opened_at = Some(now);
        state.consecutive_successes = 0;
        state.next_retry_at = chrono::Duration::from_std(state.cooldown)
            .ok()
            .map(|cooldown| Utc::now() + cooldown);
    }

    fn add_to_window(&self, state: &mut CircuitBreakerState, success: bool) {
        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);
    }

    fn calculate_error_rate(&self, state: &CircuitBreakerState) -> f64 {
        if state.window.is_empty() {
            return 0.0;
        }

        let failures = state.window.iter().filter(|&&x| !x).count();
        failures as f64 / state.window.len() as f64
    }

    /// Get current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().effective(Instant::now())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.read();
        BreakerSnapshot {
            key: self.key.to_string(),
            state: state.effective(Instant::now()),
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
            next_retry_at: state.next_retry_at,
            cooldown_ms: state.cooldown.as_millis() as u64,
        }
    }
}
