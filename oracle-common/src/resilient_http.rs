use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use crate::error::{CoreError, HttpErrorKind};

/// Tuning knobs for one [`ResilientHttp`] instance (spec §4.3). Defaults
/// match the production profile named in the spec; tests construct a
/// fast-cooldown profile explicitly.
#[derive(Debug, Clone)]
pub struct ResilientHttpConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub per_attempt_timeout: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown: Duration,
    pub bulkhead_max_concurrent: usize,
}

impl Default for ResilientHttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            per_attempt_timeout: Duration::from_secs(30),
            circuit_failure_threshold: 5,
            circuit_cooldown: Duration::from_secs(60),
            bulkhead_max_concurrent: 2,
        }
    }
}

impl ResilientHttpConfig {
    /// Fast profile for tests: sub-second cooldown, as spec §4.3 allows
    /// ("\u{2265}500 ms in tests; seconds\u{2013}minutes in production").
    #[must_use]
    pub fn test_profile() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            per_attempt_timeout: Duration::from_millis(500),
            circuit_failure_threshold: 5,
            circuit_cooldown: Duration::from_millis(500),
            bulkhead_max_concurrent: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitBreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Shared HTTP wrapper composing retry, circuit breaker, timeout, and
/// bulkhead per source name (spec §4.3). One instance is owned per
/// `SourceAdapter`; composition is outermost-first: bulkhead admits, circuit
/// breaker gates, retry wraps the per-attempt timeout.
pub struct ResilientHttp {
    source_name: String,
    config: ResilientHttpConfig,
    circuit: Arc<RwLock<CircuitBreakerState>>,
    bulkhead: Arc<Semaphore>,
}

impl ResilientHttp {
    #[must_use]
    pub fn new(source_name: impl Into<String>, config: ResilientHttpConfig) -> Self {
        let bulkhead = Arc::new(Semaphore::new(config.bulkhead_max_concurrent));
        Self {
            source_name: source_name.into(),
            config,
            circuit: Arc::new(RwLock::new(CircuitBreakerState::new())),
            bulkhead,
        }
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Runs `op` under the full stack: bulkhead admission, circuit-breaker
    /// gating, per-attempt timeout, and exponential-backoff retry on
    /// retryable [`HttpErrorKind`]s.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let _permit = self.bulkhead.try_acquire().map_err(|_| {
            CoreError::BulkheadRejected(self.source_name.clone())
        })?;

        self.check_circuit()?;

        let mut attempt: u32 = 0;
        loop {
            let timed = tokio::time::timeout(self.config.per_attempt_timeout, op()).await;
            let result = match timed {
                Ok(r) => r,
                Err(_) => Err(CoreError::Http {
                    source_name: self.source_name.clone(),
                    kind: HttpErrorKind::Timeout,
                }),
            };

            match result {
                Ok(value) => {
                    self.on_success().await;
                    return Ok(value);
                }
                Err(CoreError::Http { kind, .. }) if kind.is_retryable() && attempt < self.config.max_retries => {
                    self.on_failure().await;
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        source = %self.source_name,
                        attempt,
                        ?delay,
                        "transient HTTP failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.on_failure().await;
                    return Err(e);
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let scaled = self.config.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        scaled.min(self.config.max_delay)
    }

    async fn check_circuit(&self) -> Result<(), CoreError> {
        let mut circuit = self.circuit.write().await;
        if circuit.state == CircuitState::Open {
            let opened_at = circuit.opened_at.unwrap_or_else(Instant::now);
            if opened_at.elapsed() >= self.config.circuit_cooldown {
                circuit.state = CircuitState::HalfOpen;
                info!(source = %self.source_name, "circuit breaker half-open, admitting probe");
            } else {
                return Err(CoreError::Http {
                    source_name: self.source_name.clone(),
                    kind: HttpErrorKind::Connection,
                });
            }
        }
        Ok(())
    }

    async fn on_success(&self) {
        let mut circuit = self.circuit.write().await;
        if circuit.state != CircuitState::Closed {
            info!(source = %self.source_name, "circuit breaker closed after successful probe");
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
    }

    async fn on_failure(&self) {
        let mut circuit = self.circuit.write().await;
        circuit.consecutive_failures += 1;
        if circuit.state == CircuitState::HalfOpen
            || circuit.consecutive_failures >= self.config.circuit_failure_threshold
        {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
            warn!(
                source = %self.source_name,
                failures = circuit.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let http = ResilientHttp::new("binance", ResilientHttpConfig::test_profile());
        let calls = AtomicU32::new(0);
        let result = http
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CoreError::Http {
                            source_name: "binance".to_string(),
                            kind: HttpErrorKind::Transient(503),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let http = ResilientHttp::new("binance", ResilientHttpConfig::test_profile());
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = http
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(CoreError::Http {
                        source_name: "binance".to_string(),
                        kind: HttpErrorKind::Permanent(404),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_then_recovers_past_cooldown() {
        let http = ResilientHttp::new("okex", ResilientHttpConfig::test_profile());
        for _ in 0..5 {
            let _: Result<i32, _> = http
                .execute(|| async {
                    Err(CoreError::Http {
                        source_name: "okex".to_string(),
                        kind: HttpErrorKind::Permanent(400),
                    })
                })
                .await;
        }
        // Circuit now open; next call fails fast without invoking op.
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = http
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(1) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let result = http.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn bulkhead_rejects_beyond_concurrency_limit() {
        let mut config = ResilientHttpConfig::test_profile();
        config.bulkhead_max_concurrent = 1;
        let http = Arc::new(ResilientHttp::new("coinbase", config));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));

        let holder = {
            let http = http.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                http.execute(|| {
                    let rx = rx.clone();
                    async move {
                        let rx = rx.lock().await.take();
                        if let Some(rx) = rx {
                            let _ = rx.await;
                        }
                        Ok::<_, CoreError>(())
                    }
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result: Result<(), _> = http.execute(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(CoreError::BulkheadRejected(_))));

        let _ = tx.send(());
        let _ = holder.await;
    }
}
