//! Per-route circuit breakers for provider isolation.
//!
//! A breaker opens after a run of consecutive failures and rejects calls
//! until the cool-down elapses, then admits a single half-open trial. A
//! successful trial closes the breaker; a failed one re-opens it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub(crate) const DEFAULT_COOL_DOWN_SECS: u64 = 30;

#[derive(Debug)]
enum State {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Circuit breaker guarding one (provider, route) pair.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cool_down: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold,
            cool_down,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed. Flips to half-open when the cool-down
    /// has elapsed, admitting exactly one trial call.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        match *state {
            State::Closed { .. } => true,
            State::Open { since } if since.elapsed() >= self.cool_down => {
                *state = State::HalfOpen;
                true
            }
            State::Open { .. } | State::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        *self.lock() = State::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    warn!("Circuit breaker opened after {failures} consecutive failures");
                    *state = State::Open {
                        since: Instant::now(),
                    };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen => {
                *state = State::Open {
                    since: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), State::Open { .. })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another thread panicked mid-update;
        // the state itself stays usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lazily created breakers keyed by (provider, route).
pub struct BreakerRegistry {
    failure_threshold: u32,
    cool_down: Duration,
    breakers: Mutex<HashMap<(String, String), std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold,
            cool_down,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, provider: &str, route: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        breakers
            .entry((provider.to_string(), route.to_string()))
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(self.failure_threshold, self.cool_down))
            })
            .clone()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            Duration::from_secs(DEFAULT_COOL_DOWN_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.try_acquire());
        }
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_half_open_single_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        // Cool-down of zero: the next acquire is the half-open trial.
        assert!(breaker.try_acquire());
        assert!(!breaker.try_acquire());
        breaker.record_success();
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_registry_keys_by_provider_and_route() {
        let registry = BreakerRegistry::new(1, Duration::from_secs(60));
        registry.get("osv", "analyze").record_failure();
        assert!(registry.get("osv", "analyze").is_open());
        assert!(!registry.get("osv", "health").is_open());
        assert!(!registry.get("trustify", "analyze").is_open());
    }
}
