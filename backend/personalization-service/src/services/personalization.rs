//! Personalization orchestrator
//!
//! Ranking: user vector → feed fan-out → merge → oracle → cache + log.
//! Only the oracle call can fail the request; the cache write and log
//! append happen after a successful response and degrade silently.

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PersonalizationConfig;
use crate::models::{
    AxisScores, PreferenceUpdate, PreferenceWeights, RankedArticle, RankingDecision,
    RankingLogEntry, DEFAULT_WEIGHT,
};
use crate::services::article_source::{fetch_all_batches, ArticleSource};
use crate::services::merger::merge_batches;
use crate::services::ranking_cache::RankingCache;
use crate::services::ranking_log::RankingLogStore;
use crate::services::scoring::{FeedbackNotice, ScoringError, ScoringGateway};
use crate::services::user_vector::{UserVectorStore, VectorMutation};
use crate::store::StoreHandle;

pub const ANONYMOUS_USER: &str = "anonymous";

/// Ranking request. Absent (or non-finite) weights default to 0.5; stored
/// preferences do not apply on the ranking path.
#[derive(Debug, Clone, Default)]
pub struct RankingRequest {
    pub user_id: String,
    pub diversity: Option<f64>,
    pub novelty: Option<f64>,
    pub freshness: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingResponse {
    pub articles: Vec<RankedArticle>,
    pub explanation: String,
    pub scores: AxisScores,
    pub user_preferences: PreferenceWeights,
}

#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    pub user_id: String,
    pub article_id: String,
    pub feedback: serde_json::Value,
    pub topic: Option<String>,
}

pub struct PersonalizationService {
    source: Arc<dyn ArticleSource>,
    gateway: ScoringGateway,
    vectors: UserVectorStore,
    cache: RankingCache,
    logs: RankingLogStore,
    merge_cap: usize,
    export_limit: usize,
}

impl PersonalizationService {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        gateway: ScoringGateway,
        store: Arc<StoreHandle>,
        config: &PersonalizationConfig,
    ) -> Self {
        Self {
            source,
            gateway,
            vectors: UserVectorStore::new(store.clone(), config),
            cache: RankingCache::new(store.clone(), config),
            logs: RankingLogStore::new(store, config),
            merge_cap: config.merge_cap,
            export_limit: config.export_limit,
        }
    }

    pub fn cache(&self) -> &RankingCache {
        &self.cache
    }

    pub async fn rank(&self, request: RankingRequest) -> Result<RankingResponse, ScoringError> {
        let user_id = request.user_id.as_str();
        let vector = self.vectors.get(user_id).await;

        let weights = PreferenceWeights {
            diversity: effective_weight(request.diversity),
            novelty: effective_weight(request.novelty),
            freshness: effective_weight(request.freshness),
        };

        let batches = fetch_all_batches(self.source.as_ref()).await;
        let candidates = merge_batches(batches, self.merge_cap);
        let candidate_count = candidates.len();

        let outcome = self
            .gateway
            .score(user_id, candidates, weights, vector.reading_history)
            .await?;

        let cached = self.cache.put(&outcome.ranked).await;
        let logged = self
            .logs
            .append(&build_log_entry(user_id, weights, &outcome.ranked))
            .await;

        info!(
            user_id = %user_id,
            candidates = candidate_count,
            ranked = outcome.ranked.len(),
            cache = ?cached,
            log = ?logged,
            "Ranking served"
        );

        Ok(RankingResponse {
            articles: outcome.ranked,
            explanation: outcome.explanation,
            scores: outcome.scores,
            user_preferences: weights,
        })
    }

    /// Record a reading event and forward it to the oracle without waiting.
    pub async fn record_feedback(&self, event: FeedbackEvent) -> (VectorMutation, JoinHandle<()>) {
        // Only numeric feedback can move a topic weight.
        let topic_signal = event
            .topic
            .as_deref()
            .filter(|topic| !topic.is_empty())
            .zip(event.feedback.as_f64());

        let mutation = self
            .vectors
            .record_feedback(&event.user_id, &event.article_id, topic_signal)
            .await;

        let forward = self.gateway.forward_feedback(FeedbackNotice {
            user_id: event.user_id,
            article_id: event.article_id,
            feedback: event.feedback,
        });

        (mutation, forward)
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> VectorMutation {
        self.vectors.update_preferences(user_id, update).await
    }

    pub async fn get_preferences(&self, user_id: &str) -> PreferenceWeights {
        self.vectors.get(user_id).await.preferences
    }

    /// Most recent ranking logs for export.
    pub async fn recent_logs(&self, user_id: &str) -> Vec<RankingLogEntry> {
        self.logs.list_recent(user_id, self.export_limit).await
    }
}

fn effective_weight(requested: Option<f64>) -> f64 {
    requested.filter(|w| w.is_finite()).unwrap_or(DEFAULT_WEIGHT)
}

fn build_log_entry(
    user_id: &str,
    weights: PreferenceWeights,
    ranked: &[RankedArticle],
) -> RankingLogEntry {
    RankingLogEntry {
        user_id: user_id.to_string(),
        timestamp: chrono::Utc::now(),
        articles: ranked
            .iter()
            .enumerate()
            .map(|(position, item)| RankingDecision {
                article_id: item.article.id.clone(),
                title: item.article.title.clone(),
                original_rank: item.original_rank,
                personalized_rank: position,
                diversity_score: item.diversity_score,
                novelty_score: item.novelty_score,
                freshness_score: item.freshness_score,
                final_score: item.final_score,
                reason: decision_reason(&weights, item, position),
            })
            .collect(),
        user_preferences: weights,
    }
}

/// Human-readable reason for one placement: the rank movement and the axis
/// with the largest weighted contribution.
pub fn decision_reason(
    weights: &PreferenceWeights,
    item: &RankedArticle,
    personalized_rank: usize,
) -> String {
    let movement = match item.original_rank.cmp(&personalized_rank) {
        Ordering::Greater => format!(
            "Moved up {} from #{} to #{}",
            item.original_rank - personalized_rank,
            item.original_rank + 1,
            personalized_rank + 1
        ),
        Ordering::Less => format!(
            "Moved down {} from #{} to #{}",
            personalized_rank - item.original_rank,
            item.original_rank + 1,
            personalized_rank + 1
        ),
        Ordering::Equal => format!("Held position #{}", personalized_rank + 1),
    };

    let contributions = [
        ("diversity", weights.diversity * item.diversity_score),
        ("novelty", weights.novelty * item.novelty_score),
        ("freshness", weights.freshness * item.freshness_score),
    ];
    let dominant = contributions
        .iter()
        .filter(|(_, value)| value.is_finite() && *value > 0.0)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    match dominant {
        Some((axis, value)) => format!("{}, driven mostly by {} ({:.2} weighted)", movement, axis, value),
        None => format!("{}, no dominant preference signal", movement),
    }
}
