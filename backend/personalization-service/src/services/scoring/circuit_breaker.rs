//! Circuit breaker guarding the scoring oracle
//!
//! Consecutive oracle failures open the circuit; while open, calls fail fast
//! with `ScoringError::CircuitOpen`. After the cool-down the next calls are
//! let through half-open, and enough successes close the circuit again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ScoringError;
use crate::config::OracleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: usize,
    /// Half-open successes before closing
    pub success_threshold: usize,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
        }
    }
}

impl From<&OracleConfig> for CircuitBreakerConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_duration: Duration::from_secs(config.open_secs.max(0) as u64),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    opened_at: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!(
            "Scoring circuit breaker created: failure_threshold={}, success_threshold={}, open={:?}",
            config.failure_threshold, config.success_threshold, config.open_duration
        );

        Self {
            state: Arc::new(Mutex::new(BreakerState::default())),
            config,
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    async fn check_state(&self) -> Result<(), ScoringError> {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.open_duration);

                if elapsed >= self.config.open_duration {
                    debug!("Scoring circuit HALF_OPEN after {:?}", elapsed);
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    Ok(())
                } else {
                    warn!("Scoring circuit OPEN - failing fast ({:?} since opened)", elapsed);
                    Err(ScoringError::CircuitOpen)
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    debug!("Scoring circuit CLOSED");
                    *state = BreakerState::default();
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    "Scoring circuit OPEN after {} consecutive failures",
                    state.failure_count
                );
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                warn!("Scoring circuit HALF_OPEN probe failed - reopening");
                state.state = CircuitState::Open;
                state.success_count = 0;
                state.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Run `f` under breaker protection.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, ScoringError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ScoringError>>,
    {
        self.check_state().await?;

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
        })
    }

    async fn fail() -> Result<(), ScoringError> {
        Err(ScoringError::Status(500))
    }

    async fn succeed() -> Result<u32, ScoringError> {
        Ok(7)
    }

    #[tokio::test]
    async fn test_success_keeps_closed() {
        let cb = breaker();
        assert_eq!(cb.call(succeed).await.unwrap(), 7);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = breaker();
        let _ = cb.call(fail).await;
        let _ = cb.call(succeed).await;
        let _ = cb.call(fail).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_and_fails_fast() {
        let cb = breaker();
        let _ = cb.call(fail).await;
        let _ = cb.call(fail).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(succeed).await;
        assert!(matches!(result, Err(ScoringError::CircuitOpen)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_recovers() {
        let cb = breaker();
        let _ = cb.call(fail).await;
        let _ = cb.call(fail).await;

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(cb.call(succeed).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(cb.call(succeed).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker();
        let _ = cb.call(fail).await;
        let _ = cb.call(fail).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = cb.call(fail).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(matches!(
            cb.call(succeed).await,
            Err(ScoringError::CircuitOpen)
        ));
    }
}
