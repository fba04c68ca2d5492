#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use personalization_service::config::PersonalizationConfig;
use personalization_service::models::{Article, FeedCategory, RankedArticle};
use personalization_service::services::article_source::{ArticleSource, SourceError};
use personalization_service::services::scoring::{
    CircuitBreakerConfig, FeedbackNotice, RankRequest, RankResponse, ScoringError, ScoringGateway,
    ScoringOracle,
};
use personalization_service::services::{article_id_for, PersonalizationService};
use personalization_service::store::StoreHandle;

pub const URL_A: &str = "https://news.example.com/2024/01/15/a.html";
pub const URL_B: &str = "https://news.example.com/2024/01/15/b.html";

pub fn article(url: &str, title: &str) -> Article {
    Article {
        id: article_id_for(url),
        title: title.to_string(),
        summary: format!("Summary of {}", title),
        url: url.to_string(),
        byline: "By Staff".to_string(),
        published_date: "2024-01-15T10:30:00Z".to_string(),
        section: "world".to_string(),
        subsection: None,
        multimedia: Vec::new(),
        des_facet: Vec::new(),
        org_facet: Vec::new(),
        per_facet: Vec::new(),
        geo_facet: Vec::new(),
    }
}

/// Fixed per-feed responses; a missing category fails.
pub struct StubSource {
    feeds: HashMap<FeedCategory, Vec<Article>>,
}

impl StubSource {
    /// Primary feed `[A, B]`, popular feed `[A]`, wire feed down.
    pub fn a_b_a() -> Self {
        let mut feeds = HashMap::new();
        feeds.insert(
            FeedCategory::Primary,
            vec![article(URL_A, "Story A"), article(URL_B, "Story B")],
        );
        feeds.insert(FeedCategory::Popular, vec![article(URL_A, "Story A (popular)")]);
        Self { feeds }
    }
}

#[async_trait]
impl ArticleSource for StubSource {
    async fn fetch(&self, category: FeedCategory) -> Result<Vec<Article>, SourceError> {
        self.feeds
            .get(&category)
            .cloned()
            .ok_or(SourceError::Status(503))
    }
}

/// Oracle whose final score is the preference-weighted sum of fixed
/// per-article axis scores.
pub struct WeightedSumOracle {
    scores: HashMap<String, (f64, f64, f64)>,
    pub requests: Mutex<Vec<RankRequest>>,
    pub feedback: Mutex<Vec<FeedbackNotice>>,
}

impl WeightedSumOracle {
    /// A: diversity 0.8, B: diversity 0.3.
    pub fn fixed() -> Self {
        let mut scores = HashMap::new();
        scores.insert(URL_A.to_string(), (0.8, 0.1, 0.2));
        scores.insert(URL_B.to_string(), (0.3, 0.9, 0.7));
        Self {
            scores,
            requests: Mutex::new(Vec::new()),
            feedback: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScoringOracle for WeightedSumOracle {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse, ScoringError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut ranked: Vec<RankedArticle> = request
            .articles
            .iter()
            .enumerate()
            .map(|(i, article)| {
                let (d, n, f) = self.scores.get(&article.url).copied().unwrap_or_default();
                RankedArticle {
                    article: article.clone(),
                    original_rank: i,
                    diversity_score: d,
                    novelty_score: n,
                    freshness_score: f,
                    final_score: request.preferences.apply(d, n, f),
                    bandit_score: None,
                    features: Vec::new(),
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap());

        let count = ranked.len().max(1) as f64;
        Ok(RankResponse {
            diversity_score: ranked.iter().map(|r| r.diversity_score).sum::<f64>() / count,
            novelty_score: ranked.iter().map(|r| r.novelty_score).sum::<f64>() / count,
            freshness_score: ranked.iter().map(|r| r.freshness_score).sum::<f64>() / count,
            ranked_articles: ranked,
            ranking_explanation: "Prioritizing diverse topics and perspectives.".to_string(),
        })
    }

    async fn feedback(&self, notice: &FeedbackNotice) -> Result<(), ScoringError> {
        self.feedback.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Oracle that always fails.
pub struct DownOracle;

#[async_trait]
impl ScoringOracle for DownOracle {
    async fn rank(&self, _request: &RankRequest) -> Result<RankResponse, ScoringError> {
        Err(ScoringError::Status(500))
    }

    async fn feedback(&self, _notice: &FeedbackNotice) -> Result<(), ScoringError> {
        Err(ScoringError::Status(500))
    }
}

pub fn build_service(
    oracle: Arc<dyn ScoringOracle>,
    store: Arc<StoreHandle>,
) -> PersonalizationService {
    let gateway = ScoringGateway::with_breaker(
        oracle,
        Duration::from_secs(5),
        CircuitBreakerConfig::default(),
    );
    PersonalizationService::new(
        Arc::new(StubSource::a_b_a()),
        gateway,
        store,
        &PersonalizationConfig::default(),
    )
}
