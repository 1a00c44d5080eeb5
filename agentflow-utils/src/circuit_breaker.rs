//! ABOUTME: Circuit breaker with CLOSED/OPEN/HALF_OPEN states, one per endpoint
//! ABOUTME: Transitions are serialized under a mutex; retry wraps a breaker-protected call

use crate::retry::RetryClass;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - calls flow normally.
    Closed,
    /// Circuit is open - calls fail immediately.
    Open,
    /// Circuit is half-open - probing whether the endpoint recovered.
    HalfOpen,
}

/// Tuning for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in the closed state that trip the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing.
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes required to close again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_success_threshold: 3,
        }
    }
}

/// Error for a call rejected or failed under breaker protection.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the callee was not invoked.
    #[error("circuit breaker is open")]
    Open,
    /// The callee was invoked and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E: RetryClass> RetryClass for BreakerError<E> {
    fn is_retriable(&self) -> bool {
        match self {
            // Retrying an open circuit would only hammer the breaker.
            BreakerError::Open => false,
            BreakerError::Inner(e) => e.is_retriable(),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

/// Endpoint-level failure gate.
///
/// Closed: calls pass, consecutive failures count up; at the threshold the
/// circuit opens. Open: calls are rejected until the recovery timeout
/// elapses, then the circuit half-opens. Half-open: calls pass, any failure
/// reopens, enough consecutive successes close.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                half_open_successes: 0,
            }),
        }
    }

    /// Current state (open-to-half-open transitions happen on acquire).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Admission check; transitions OPEN to HALF_OPEN once the recovery
    /// timeout has elapsed.
    fn try_acquire(&self) -> Result<(), ()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!("circuit breaker entering half-open state");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    info!("circuit breaker closed after successful recovery");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        match inner.state {
            CircuitState::HalfOpen => {
                warn!("circuit breaker reopening after failure in half-open state");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        "circuit breaker opening after repeated failures"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run `op` under breaker protection.
    ///
    /// Returns [`BreakerError::Open`] without invoking the callee when the
    /// circuit rejects the call.
    pub async fn call<T, E, Fut>(&self, op: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if self.try_acquire().is_err() {
            return Err(BreakerError::Open);
        }
        match op.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }
}

/// Shared registry keying one breaker per logical endpoint.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Breaker for `endpoint`, created on first use.
    pub fn for_endpoint(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CallError;

    impl std::fmt::Display for CallError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "call error")
        }
    }

    impl RetryClass for CallError {
        fn is_retriable(&self) -> bool {
            true
        }
    }

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
            half_open_success_threshold: 2,
        })
    }

    #[tokio::test]
    async fn test_opens_after_exact_threshold() {
        let breaker = breaker(2, Duration::from_secs(60));

        for _ in 0..2 {
            let result: Result<(), _> = breaker.call(async { Err(CallError) }).await;
            assert!(matches!(result, Err(BreakerError::Inner(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // The next call must be rejected without invoking the callee.
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result: Result<(), BreakerError<CallError>> = breaker
            .call(async {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open)));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_when_closed() {
        let breaker = breaker(3, Duration::from_secs(60));
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Err(CallError) }).await;
        assert_eq!(breaker.failure_count(), 1);

        let before = breaker.failure_count();
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Ok(()) }).await;
        assert!(breaker.failure_count() <= before);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_recovery_closes_circuit() {
        let breaker = breaker(1, Duration::from_millis(0));
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Err(CallError) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Recovery timeout of zero: next call probes in half-open.
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Ok(()) }).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Ok(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(1, Duration::from_millis(0));
        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Err(CallError) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let _: Result<(), BreakerError<CallError>> = breaker.call(async { Err(CallError) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_registry_returns_same_breaker_per_endpoint() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.for_endpoint("http://127.0.0.1:8080/v1");
        let b = registry.for_endpoint("http://127.0.0.1:8080/v1");
        let c = registry.for_endpoint("http://other:8080/v1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
