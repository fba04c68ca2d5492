use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{FeedbackNotice, RankRequest, RankResponse, ScoringError, ScoringOracle};
use crate::config::OracleConfig;

/// Scoring oracle reached over HTTP: `POST {base}/rank` and
/// `POST {base}/feedback`.
pub struct HttpScoringOracle {
    client: HttpClient,
    base_url: String,
}

impl HttpScoringOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, ScoringError> {
        let client = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ScoringError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn request_error(e: reqwest::Error) -> ScoringError {
    ScoringError::Request(e.to_string())
}

#[async_trait]
impl ScoringOracle for HttpScoringOracle {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse, ScoringError> {
        let response = self
            .client
            .post(self.endpoint("rank"))
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(ScoringError::Status(response.status().as_u16()));
        }

        response
            .json::<RankResponse>()
            .await
            .map_err(|e| ScoringError::Decode(e.to_string()))
    }

    async fn feedback(&self, notice: &FeedbackNotice) -> Result<(), ScoringError> {
        let response = self
            .client
            .post(self.endpoint("feedback"))
            .json(notice)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(ScoringError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
