//! Global ranking cache
//!
//! Holds recently computed ranked lists under `articles:{generated_at_millis}`
//! with a TTL. The key carries no user or preference dimension, so an entry
//! is whatever ranking was computed last for anyone. The ranking path writes
//! here but does not serve from it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PersonalizationConfig;
use crate::metrics;
use crate::models::{CachedRankingResult, RankedArticle};
use crate::store::{StoreHandle, StoreKey, WriteOutcome, CACHED_RANKING_PREFIX};

const COMPONENT: &str = "ranking_cache";

pub struct RankingCache {
    store: Arc<StoreHandle>,
    ttl_secs: u64,
}

impl RankingCache {
    pub fn new(store: Arc<StoreHandle>, config: &PersonalizationConfig) -> Self {
        Self {
            store,
            ttl_secs: config.cache_ttl_secs,
        }
    }

    /// Store `articles` under a fresh generation key with the default TTL.
    pub async fn put(&self, articles: &[RankedArticle]) -> WriteOutcome {
        self.put_at(articles, Utc::now(), self.ttl_secs).await
    }

    async fn put_at(
        &self,
        articles: &[RankedArticle],
        generated_at: DateTime<Utc>,
        ttl_secs: u64,
    ) -> WriteOutcome {
        let key = StoreKey::cached_ranking(generated_at.timestamp_millis());
        let entry = CachedRankingResult {
            generated_at,
            ttl_secs,
            articles: articles.to_vec(),
        };

        let result = match serde_json::to_string(&entry) {
            Ok(raw) => self.store.set_ex(&key, &raw, ttl_secs).await,
            Err(e) => Err(e.into()),
        };
        WriteOutcome::settle(COMPONENT, &key, result)
    }

    /// Most recently generated entry that has not expired.
    pub async fn get_latest(&self) -> Option<CachedRankingResult> {
        let keys = match self.store.scan_prefix(CACHED_RANKING_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Ranking cache scan failed");
                metrics::record_store_read_fallback(COMPONENT);
                return None;
            }
        };

        let mut generations: Vec<(i64, String)> = keys
            .into_iter()
            .filter_map(|key| StoreKey::cached_ranking_generation(&key).map(|gen| (gen, key)))
            .collect();
        generations.sort_by(|a, b| b.0.cmp(&a.0));

        // Keys can expire between the scan and the read; fall back to the
        // next newest.
        for (_, key) in generations {
            match self.store.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<CachedRankingResult>(&raw) {
                    Ok(entry) => {
                        debug!(key = %key, "Ranking cache hit");
                        return Some(entry);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Unreadable ranking cache entry"),
                },
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Ranking cache read failed");
                    metrics::record_store_read_fallback(COMPONENT);
                    return None;
                }
            }
        }

        debug!("Ranking cache miss");
        None
    }
}
