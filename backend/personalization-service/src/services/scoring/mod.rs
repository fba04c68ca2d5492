//! Scoring gateway
//!
//! Packages candidates and the user's vector into one request to the
//! external scoring oracle and unpacks the ranked result. A timeout, a
//! non-success response or an open circuit is a single `ScoringError`;
//! nothing is ranked locally. Feedback is forwarded on a detached task.

mod circuit_breaker;
mod oracle;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use oracle::HttpScoringOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::OracleConfig;
use crate::metrics;
use crate::models::{Article, AxisScores, PreferenceWeights, RankedArticle};

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Oracle returned status {0}")]
    Status(u16),

    #[error("Oracle response could not be decoded: {0}")]
    Decode(String),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scoring circuit is open")]
    CircuitOpen,
}

impl ScoringError {
    fn status_label(&self) -> &'static str {
        match self {
            ScoringError::Timeout(_) => "timeout",
            ScoringError::CircuitOpen => "rejected",
            _ => "error",
        }
    }
}

/// Body of `POST {oracle}/rank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    pub articles: Vec<Article>,
    pub user_id: String,
    pub preferences: PreferenceWeights,
    pub reading_history: Vec<String>,
}

/// Response of `POST {oracle}/rank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankResponse {
    pub ranked_articles: Vec<RankedArticle>,
    #[serde(default)]
    pub ranking_explanation: String,
    #[serde(default)]
    pub diversity_score: f64,
    #[serde(default)]
    pub novelty_score: f64,
    #[serde(default)]
    pub freshness_score: f64,
}

/// Body of `POST {oracle}/feedback`. The feedback value is forwarded as
/// received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackNotice {
    pub user_id: String,
    pub article_id: String,
    pub feedback: serde_json::Value,
}

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse, ScoringError>;

    async fn feedback(&self, notice: &FeedbackNotice) -> Result<(), ScoringError>;
}

/// Oracle result for one ranking request.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub ranked: Vec<RankedArticle>,
    pub explanation: String,
    pub scores: AxisScores,
}

pub struct ScoringGateway {
    oracle: Arc<dyn ScoringOracle>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ScoringGateway {
    pub fn new(oracle: Arc<dyn ScoringOracle>, config: &OracleConfig) -> Self {
        Self::with_breaker(
            oracle,
            config.timeout(),
            CircuitBreakerConfig::from(config),
        )
    }

    pub fn with_breaker(
        oracle: Arc<dyn ScoringOracle>,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            oracle,
            breaker: CircuitBreaker::new(breaker),
            timeout,
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// One bounded request to the oracle.
    pub async fn score(
        &self,
        user_id: &str,
        candidates: Vec<Article>,
        preferences: PreferenceWeights,
        reading_history: Vec<String>,
    ) -> Result<ScoringOutcome, ScoringError> {
        let request = RankRequest {
            articles: candidates,
            user_id: user_id.to_string(),
            preferences,
            reading_history,
        };

        let started = Instant::now();
        let oracle = &self.oracle;
        let request_ref = &request;
        let timeout = self.timeout;

        let result = self
            .breaker
            .call(|| async move {
                match tokio::time::timeout(timeout, oracle.rank(request_ref)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScoringError::Timeout(timeout)),
                }
            })
            .await;

        match result {
            Ok(response) => {
                metrics::record_oracle_request("rank", "success");
                metrics::observe_oracle_latency(started.elapsed());
                debug!(
                    user_id = %user_id,
                    candidates = request.articles.len(),
                    ranked = response.ranked_articles.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Oracle ranking received"
                );

                Ok(ScoringOutcome {
                    ranked: response.ranked_articles,
                    explanation: response.ranking_explanation,
                    scores: AxisScores {
                        diversity: response.diversity_score,
                        novelty: response.novelty_score,
                        freshness: response.freshness_score,
                    },
                })
            }
            Err(e) => {
                metrics::record_oracle_request("rank", e.status_label());
                error!(user_id = %user_id, error = %e, "Scoring oracle call failed");
                Err(e)
            }
        }
    }

    /// Forward feedback on a detached task. Delivery failures are logged
    /// and otherwise ignored; the handle is only useful to tests.
    pub fn forward_feedback(&self, notice: FeedbackNotice) -> JoinHandle<()> {
        let oracle = Arc::clone(&self.oracle);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, oracle.feedback(&notice)).await {
                Ok(result) => result,
                Err(_) => Err(ScoringError::Timeout(timeout)),
            };

            match result {
                Ok(()) => {
                    metrics::record_oracle_request("feedback", "success");
                    debug!(
                        user_id = %notice.user_id,
                        article_id = %notice.article_id,
                        "Feedback forwarded to scoring oracle"
                    );
                }
                Err(e) => {
                    metrics::record_oracle_request("feedback", e.status_label());
                    warn!(
                        user_id = %notice.user_id,
                        article_id = %notice.article_id,
                        error = %e,
                        "Failed to send feedback to scoring oracle"
                    );
                }
            }
        })
    }
}
