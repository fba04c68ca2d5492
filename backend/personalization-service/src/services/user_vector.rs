//! User vector store
//!
//! Per-user preference weights, reading history and topic interests under
//! `user:{id}`. Reads never fail: a missing record, an unreadable record or
//! an unavailable store all yield the default vector. Every mutation
//! rewrites the record with the full retention TTL, so active users keep
//! their state and inactive users expire.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{HistoryPolicy, PersonalizationConfig};
use crate::metrics;
use crate::models::{PreferenceUpdate, UserVector};
use crate::store::{StoreHandle, StoreKey, WriteOutcome};

const COMPONENT: &str = "user_vector";

/// Vector after a mutation, plus whether it reached the store.
#[derive(Debug, Clone)]
pub struct VectorMutation {
    pub vector: UserVector,
    pub outcome: WriteOutcome,
}

pub struct UserVectorStore {
    store: Arc<StoreHandle>,
    ttl_secs: u64,
    history_cap: usize,
    history_policy: HistoryPolicy,
}

impl UserVectorStore {
    pub fn new(store: Arc<StoreHandle>, config: &PersonalizationConfig) -> Self {
        Self {
            store,
            ttl_secs: config.vector_ttl_secs,
            history_cap: config.history_cap,
            history_policy: config.history_policy,
        }
    }

    /// Stored vector, or defaults for an unseen user. Never persists.
    pub async fn get(&self, user_id: &str) -> UserVector {
        let key = StoreKey::user_vector(user_id);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<UserVector>(&raw) {
                Ok(mut vector) => {
                    self.normalize(&mut vector);
                    vector
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Unreadable user vector, using defaults");
                    UserVector::with_defaults(user_id)
                }
            },
            Ok(None) => {
                debug!(user_id = %user_id, "No stored user vector, using defaults");
                UserVector::with_defaults(user_id)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User vector read failed, using defaults");
                metrics::record_store_read_fallback(COMPONENT);
                UserVector::with_defaults(user_id)
            }
        }
    }

    /// Merge the supplied weights over the stored ones, clamped to [0, 1].
    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> VectorMutation {
        self.mutate(user_id, |vector| update.merge_into(&mut vector.preferences))
            .await
    }

    /// Prepend `article_id` to the reading history, bounded by the history cap.
    pub async fn append_reading_history(&self, user_id: &str, article_id: &str) -> VectorMutation {
        let (cap, policy) = (self.history_cap, self.history_policy);
        self.mutate(user_id, |vector| {
            push_history(&mut vector.reading_history, article_id, cap, policy)
        })
        .await
    }

    /// Add `delta` to a topic's interest weight.
    pub async fn record_topic_interest(
        &self,
        user_id: &str,
        topic: &str,
        delta: f64,
    ) -> VectorMutation {
        self.mutate(user_id, |vector| add_interest(vector, topic, delta))
            .await
    }

    /// Feedback event: history append plus optional topic signal, written once.
    pub async fn record_feedback(
        &self,
        user_id: &str,
        article_id: &str,
        topic_signal: Option<(&str, f64)>,
    ) -> VectorMutation {
        let (cap, policy) = (self.history_cap, self.history_policy);
        self.mutate(user_id, |vector| {
            push_history(&mut vector.reading_history, article_id, cap, policy);
            if let Some((topic, delta)) = topic_signal {
                add_interest(vector, topic, delta);
            }
        })
        .await
    }

    /// Read-modify-write. Concurrent mutations for one user are last
    /// writer wins.
    async fn mutate(&self, user_id: &str, apply: impl FnOnce(&mut UserVector)) -> VectorMutation {
        let mut vector = self.get(user_id).await;
        apply(&mut vector);
        vector.last_updated = Utc::now();

        let outcome = self.persist(&vector).await;
        VectorMutation { vector, outcome }
    }

    async fn persist(&self, vector: &UserVector) -> WriteOutcome {
        let key = StoreKey::user_vector(&vector.user_id);
        let result = match serde_json::to_string(vector) {
            Ok(raw) => self.store.set_ex(&key, &raw, self.ttl_secs).await,
            Err(e) => Err(e.into()),
        };
        WriteOutcome::settle(COMPONENT, &key, result)
    }

    /// Records written before clamping was enforced may carry weights
    /// outside [0, 1] or an overlong history.
    fn normalize(&self, vector: &mut UserVector) {
        PreferenceUpdate {
            diversity: Some(vector.preferences.diversity),
            novelty: Some(vector.preferences.novelty),
            freshness: Some(vector.preferences.freshness),
        }
        .merge_into(&mut vector.preferences);
        vector.reading_history.truncate(self.history_cap);
    }
}

fn push_history(history: &mut Vec<String>, article_id: &str, cap: usize, policy: HistoryPolicy) {
    if policy == HistoryPolicy::MoveToFront {
        history.retain(|id| id != article_id);
    }
    history.insert(0, article_id.to_string());
    history.truncate(cap);
}

fn add_interest(vector: &mut UserVector, topic: &str, delta: f64) {
    if !delta.is_finite() {
        return;
    }
    *vector.topic_interests.entry(topic.to_string()).or_insert(0.0) += delta;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::failing_handle;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::time::Duration;

    fn memory_store(config: &PersonalizationConfig) -> (Arc<MemoryStore>, UserVectorStore) {
        let memory = Arc::new(MemoryStore::new());
        let handle = Arc::new(StoreHandle::with_backend(memory.clone()));
        (memory, UserVectorStore::new(handle, config))
    }

    #[tokio::test]
    async fn test_unseen_user_gets_defaults_without_persisting() {
        let (memory, store) = memory_store(&PersonalizationConfig::default());

        let vector = store.get("new-user").await;
        assert_eq!(vector.user_id, "new-user");
        assert_eq!(vector.preferences.diversity, 0.5);
        assert_eq!(vector.preferences.novelty, 0.5);
        assert_eq!(vector.preferences.freshness, 0.5);
        assert!(vector.reading_history.is_empty());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_partial_update_clamps_and_persists() {
        let (_, store) = memory_store(&PersonalizationConfig::default());

        let mutation = store
            .update_preferences(
                "u1",
                &PreferenceUpdate {
                    diversity: Some(1.4),
                    novelty: None,
                    freshness: Some(-3.0),
                },
            )
            .await;
        assert!(mutation.outcome.is_persisted());

        let stored = store.get("u1").await;
        assert_eq!(stored.preferences.diversity, 1.0);
        assert_eq!(stored.preferences.novelty, 0.5);
        assert_eq!(stored.preferences.freshness, 0.0);
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent_hundred() {
        let (_, store) = memory_store(&PersonalizationConfig::default());

        for i in 1..=101 {
            store
                .append_reading_history("u1", &format!("article-{}", i))
                .await;
        }

        let vector = store.get("u1").await;
        assert_eq!(vector.reading_history.len(), 100);
        assert_eq!(vector.reading_history[0], "article-101");
        assert_eq!(vector.reading_history[99], "article-2");
        assert!(!vector.reading_history.contains(&"article-1".to_string()));
    }

    #[tokio::test]
    async fn test_repeated_view_keeps_duplicates_by_default() {
        let (_, store) = memory_store(&PersonalizationConfig::default());

        store.append_reading_history("u1", "a").await;
        store.append_reading_history("u1", "b").await;
        store.append_reading_history("u1", "a").await;

        let vector = store.get("u1").await;
        assert_eq!(vector.reading_history, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_repeated_view_moves_to_front_when_configured() {
        let config = PersonalizationConfig {
            history_policy: HistoryPolicy::MoveToFront,
            ..PersonalizationConfig::default()
        };
        let (_, store) = memory_store(&config);

        store.append_reading_history("u1", "a").await;
        store.append_reading_history("u1", "b").await;
        store.append_reading_history("u1", "a").await;

        let vector = store.get("u1").await;
        assert_eq!(vector.reading_history, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_feedback_updates_history_and_topic() {
        let (_, store) = memory_store(&PersonalizationConfig::default());

        store.record_feedback("u1", "a", Some(("climate", 1.0))).await;
        store.record_feedback("u1", "b", Some(("climate", -0.25))).await;
        store.record_topic_interest("u1", "sports", 2.0).await;

        let vector = store.get("u1").await;
        assert_eq!(vector.reading_history, vec!["b", "a"]);
        assert_eq!(vector.topic_interests["climate"], 0.75);
        assert_eq!(vector.topic_interests["sports"], 2.0);
    }

    #[tokio::test]
    async fn test_store_outage_degrades() {
        let store = UserVectorStore::new(failing_handle(), &PersonalizationConfig::default());

        let vector = store.get("u1").await;
        assert_eq!(vector.preferences.diversity, 0.5);

        let mutation = store.append_reading_history("u1", "a").await;
        assert_eq!(mutation.outcome, WriteOutcome::DegradedLocalOnly);
        // The caller still sees the mutated copy.
        assert_eq!(mutation.vector.reading_history, vec!["a"]);
    }

    #[tokio::test]
    async fn test_unclamped_legacy_record_is_normalized() {
        let (memory, store) = memory_store(&PersonalizationConfig::default());
        let raw = serde_json::json!({
            "userId": "u1",
            "preferences": {"diversity": 3.0, "novelty": 0.2, "freshness": -1.0},
            "readingHistory": [],
            "topicInterests": {},
            "lastUpdated": "2024-01-15T10:30:00Z"
        });
        memory
            .set_ex("user:u1", &raw.to_string(), 60)
            .await
            .unwrap();

        let vector = store.get("u1").await;
        assert_eq!(vector.preferences.diversity, 1.0);
        assert_eq!(vector.preferences.novelty, 0.2);
        assert_eq!(vector.preferences.freshness, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_slides_expiry() {
        let (_, store) = memory_store(&PersonalizationConfig::default());
        let day = Duration::from_secs(24 * 60 * 60);

        store.append_reading_history("u1", "a").await;
        tokio::time::advance(day * 20).await;
        store.append_reading_history("u1", "b").await;
        tokio::time::advance(day * 20).await;

        // 40 days since creation, 20 since the last write.
        assert_eq!(store.get("u1").await.reading_history, vec!["b", "a"]);

        tokio::time::advance(day * 11).await;
        assert!(store.get("u1").await.reading_history.is_empty());
    }
}
