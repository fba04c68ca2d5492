//! Ranking log store
//!
//! Each ranking decision is written under
//! `ranking_log:{user_id}:{millis}:{nonce}` with a 7 day TTL, and its key is
//! pushed onto `user_logs:{user_id}` (most recent first, trimmed to 100).
//! Body write and index push go through one atomic store operation. Index
//! entries whose body has expired are skipped on read.

use chrono::SecondsFormat;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PersonalizationConfig;
use crate::metrics;
use crate::models::RankingLogEntry;
use crate::store::{CappedAppend, StoreHandle, StoreKey, WriteOutcome};

const COMPONENT: &str = "ranking_log";

pub const CSV_HEADER: &str = "timestamp,article_title,original_rank,personalized_rank,diversity_score,novelty_score,freshness_score,final_score,explanation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    /// One row per article decision.
    Csv,
}

pub struct RankingLogStore {
    store: Arc<StoreHandle>,
    ttl_secs: u64,
    index_cap: usize,
}

impl RankingLogStore {
    pub fn new(store: Arc<StoreHandle>, config: &PersonalizationConfig) -> Self {
        Self {
            store,
            ttl_secs: config.log_ttl_secs,
            index_cap: config.log_index_cap,
        }
    }

    pub async fn append(&self, entry: &RankingLogEntry) -> WriteOutcome {
        // Two rankings for one user in the same millisecond must not collide.
        let nonce = Uuid::new_v4().simple().to_string();
        let key = StoreKey::ranking_log(
            &entry.user_id,
            entry.timestamp.timestamp_millis(),
            &nonce[..8],
        );
        let index_key = StoreKey::user_log_index(&entry.user_id);

        let result = match serde_json::to_string(entry) {
            Ok(raw) => {
                self.store
                    .append_capped(CappedAppend {
                        item_key: &key,
                        value: &raw,
                        item_ttl_secs: self.ttl_secs,
                        index_key: &index_key,
                        index_cap: self.index_cap,
                        index_ttl_secs: self.ttl_secs,
                    })
                    .await
            }
            Err(e) => Err(e.into()),
        };

        let outcome = WriteOutcome::settle(COMPONENT, &key, result);
        if outcome.is_persisted() {
            debug!(
                user_id = %entry.user_id,
                key = %key,
                decisions = entry.articles.len(),
                "Ranking log appended"
            );
        }
        outcome
    }

    /// Up to `limit` entries for `user_id`, most recent first.
    pub async fn list_recent(&self, user_id: &str, limit: usize) -> Vec<RankingLogEntry> {
        let index_key = StoreKey::user_log_index(user_id);

        let handles = match self.store.list_head(&index_key, limit).await {
            Ok(handles) => handles,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Ranking log index read failed");
                metrics::record_store_read_fallback(COMPONENT);
                return Vec::new();
            }
        };

        let bodies = match self.store.get_many(&handles).await {
            Ok(bodies) => bodies,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Ranking log read failed");
                metrics::record_store_read_fallback(COMPONENT);
                return Vec::new();
            }
        };

        let mut dangling = 0usize;
        let entries: Vec<RankingLogEntry> = handles
            .iter()
            .zip(bodies)
            .filter_map(|(handle, body)| {
                let Some(raw) = body else {
                    dangling += 1;
                    return None;
                };
                match serde_json::from_str(&raw) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(key = %handle, error = %e, "Unreadable ranking log entry");
                        None
                    }
                }
            })
            .collect();

        if dangling > 0 {
            debug!(user_id = %user_id, dangling, "Skipped expired ranking log entries");
        }
        entries
    }
}

/// Structured export: `{"logs": [...]}`.
pub fn export_json(entries: &[RankingLogEntry]) -> serde_json::Value {
    serde_json::json!({ "logs": entries })
}

/// Tabular export: header plus one row per article decision. Title and
/// reason are always quoted with embedded quotes doubled.
pub fn export_csv(entries: &[RankingLogEntry]) -> String {
    let mut out = String::from(CSV_HEADER);

    for entry in entries {
        let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        for decision in &entry.articles {
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                "\n{},{},{},{},{},{},{},{},{}",
                timestamp,
                quote(&decision.title),
                decision.original_rank,
                decision.personalized_rank,
                decision.diversity_score,
                decision.novelty_score,
                decision.freshness_score,
                decision.final_score,
                quote(&decision.reason),
            );
        }
    }

    out
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Attachment filename for a user's tabular export. Characters that are
/// unsafe in a header value or a path are replaced.
pub fn csv_filename(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("ranking-logs-{}.csv", safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PreferenceWeights, RankingDecision};
    use crate::store::testing::failing_handle;
    use crate::store::{KeyValueStore, MemoryStore};
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn decision(title: &str, reason: &str) -> RankingDecision {
        RankingDecision {
            article_id: format!("id-{}", title),
            title: title.to_string(),
            original_rank: 3,
            personalized_rank: 0,
            diversity_score: 0.8,
            novelty_score: 0.125,
            freshness_score: 1.0,
            final_score: 0.6625,
            reason: reason.to_string(),
        }
    }

    fn entry(user_id: &str, timestamp: DateTime<Utc>, title: &str) -> RankingLogEntry {
        RankingLogEntry {
            user_id: user_id.to_string(),
            timestamp,
            articles: vec![decision(title, "Ranked up by diversity")],
            user_preferences: PreferenceWeights::default(),
        }
    }

    fn log_store(config: &PersonalizationConfig) -> (Arc<MemoryStore>, RankingLogStore) {
        let memory = Arc::new(MemoryStore::new());
        let handle = Arc::new(StoreHandle::with_backend(memory.clone()));
        (memory, RankingLogStore::new(handle, config))
    }

    #[tokio::test]
    async fn test_list_recent_is_most_recent_first() {
        let (_, logs) = log_store(&PersonalizationConfig::default());
        for (t, title) in [(1, "E1"), (2, "E2"), (3, "E3")] {
            assert!(logs.append(&entry("u1", at(t), title)).await.is_persisted());
        }

        let recent = logs.list_recent("u1", 2).await;
        let titles: Vec<_> = recent.iter().map(|e| e.articles[0].title.as_str()).collect();
        assert_eq!(titles, vec!["E3", "E2"]);
    }

    #[tokio::test]
    async fn test_logs_are_per_user() {
        let (_, logs) = log_store(&PersonalizationConfig::default());
        logs.append(&entry("u1", at(1), "mine")).await;
        logs.append(&entry("u2", at(2), "theirs")).await;

        let recent = logs.list_recent("u1", 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].articles[0].title, "mine");
        assert!(logs.list_recent("nobody", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_same_millisecond_appends_do_not_collide() {
        let (_, logs) = log_store(&PersonalizationConfig::default());
        logs.append(&entry("u1", at(1), "first")).await;
        logs.append(&entry("u1", at(1), "second")).await;

        assert_eq!(logs.list_recent("u1", 10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_index_is_bounded() {
        let config = PersonalizationConfig {
            log_index_cap: 3,
            ..PersonalizationConfig::default()
        };
        let (_, logs) = log_store(&config);
        for t in 1..=5 {
            logs.append(&entry("u1", at(t), &format!("E{}", t))).await;
        }

        let recent = logs.list_recent("u1", 10).await;
        let titles: Vec<_> = recent.iter().map(|e| e.articles[0].title.as_str()).collect();
        assert_eq!(titles, vec!["E5", "E4", "E3"]);
    }

    #[tokio::test]
    async fn test_dangling_handle_is_skipped() {
        let (memory, logs) = log_store(&PersonalizationConfig::default());
        logs.append(&entry("u1", at(1), "E1")).await;

        // Index entry whose body never landed.
        memory
            .append_capped(CappedAppend {
                item_key: "ranking_log:u1:0:missing",
                value: "{}",
                item_ttl_secs: 0,
                index_key: "user_logs:u1",
                index_cap: 100,
                index_ttl_secs: 600,
            })
            .await
            .unwrap();
        logs.append(&entry("u1", at(2), "E2")).await;

        let recent = logs.list_recent("u1", 10).await;
        let titles: Vec<_> = recent.iter().map(|e| e.articles[0].title.as_str()).collect();
        assert_eq!(titles, vec!["E2", "E1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let (_, logs) = log_store(&PersonalizationConfig::default());
        logs.append(&entry("u1", at(1), "E1")).await;

        tokio::time::advance(Duration::from_secs(6 * 24 * 60 * 60)).await;
        assert_eq!(logs.list_recent("u1", 10).await.len(), 1);

        tokio::time::advance(Duration::from_secs(2 * 24 * 60 * 60)).await;
        assert!(logs.list_recent("u1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage() {
        let logs = RankingLogStore::new(failing_handle(), &PersonalizationConfig::default());
        assert_eq!(
            logs.append(&entry("u1", at(1), "E1")).await,
            WriteOutcome::DegradedLocalOnly
        );
        assert!(logs.list_recent("u1", 10).await.is_empty());
    }

    #[test]
    fn test_csv_quotes_free_text() {
        let mut log = entry("u1", at(0), "Say \"hello\", world");
        log.articles[0].reason = "Fresh, \"breaking\"".to_string();

        let csv = export_csv(&[log]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some(
                "2023-11-14T22:13:20.000Z,\"Say \"\"hello\"\", world\",3,0,0.8,0.125,1,0.6625,\"Fresh, \"\"breaking\"\"\""
            )
        );
        assert_eq!(lines.next(), None);
    }

    /// Split one CSV row, honoring quoted fields.
    fn split_row(row: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = row.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                ('"', _) => in_quotes = !in_quotes,
                (',', false) => fields.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        fields.push(current);
        fields
    }

    #[test]
    fn test_json_and_csv_carry_identical_scores() {
        let mut log = entry("u1", at(0), "a, \"quoted\" title");
        log.articles.push(RankingDecision {
            diversity_score: 0.1 + 0.2,
            novelty_score: 1.0 / 3.0,
            freshness_score: -0.0001,
            final_score: 12.5,
            ..decision("b", "plain")
        });

        let json = export_json(std::slice::from_ref(&log));
        let csv = export_csv(std::slice::from_ref(&log));

        for (row, decision) in csv.lines().skip(1).zip(json["logs"][0]["articles"].as_array().unwrap()) {
            let fields = split_row(row);
            assert_eq!(fields.len(), 9);
            assert_eq!(fields[1], decision["title"].as_str().unwrap());
            for (column, key) in [
                (4, "diversityScore"),
                (5, "noveltyScore"),
                (6, "freshnessScore"),
                (7, "finalScore"),
            ] {
                let from_csv: f64 = fields[column].parse().unwrap();
                assert_eq!(from_csv, decision[key].as_f64().unwrap());
            }
        }
    }

    #[test]
    fn test_csv_filename_is_sanitized() {
        assert_eq!(csv_filename("user-1"), "ranking-logs-user-1.csv");
        assert_eq!(csv_filename("a\"b/c"), "ranking-logs-a_b_c.csv");
    }

    #[test]
    fn test_export_format_parses_lowercase() {
        let format: ExportFormat = serde_json::from_str("\"csv\"").unwrap();
        assert_eq!(format, ExportFormat::Csv);
        assert_eq!(ExportFormat::default(), ExportFormat::Json);
        assert!(serde_json::from_str::<ExportFormat>("\"xml\"").is_err());
    }
}
