use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Upstream feeds, in merge priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedCategory {
    Primary,
    Popular,
    Wire,
}

impl FeedCategory {
    pub const PRIORITY: [FeedCategory; 3] =
        [FeedCategory::Primary, FeedCategory::Popular, FeedCategory::Wire];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedCategory::Primary => "primary",
            FeedCategory::Popular => "popular",
            FeedCategory::Wire => "wire",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaVariant {
    pub format: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Candidate article as exchanged with the scoring oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub url: String,
    pub byline: String,
    pub published_date: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub multimedia: Vec<MediaVariant>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub des_facet: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub org_facet: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub per_facet: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub geo_facet: Vec<String>,
}

/// List fields that peers send as `null` (or `""` from the news feeds)
/// when empty.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        List(Vec<T>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Lenient::<T>::deserialize(deserializer)? {
        Lenient::List(values) => values,
        Lenient::Other(_) => Vec::new(),
    })
}

pub const DEFAULT_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeights {
    pub diversity: f64,
    pub novelty: f64,
    pub freshness: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self {
            diversity: DEFAULT_WEIGHT,
            novelty: DEFAULT_WEIGHT,
            freshness: DEFAULT_WEIGHT,
        }
    }
}

impl PreferenceWeights {
    /// Weighted sum of per-axis scores.
    pub fn apply(&self, diversity: f64, novelty: f64, freshness: f64) -> f64 {
        self.diversity * diversity + self.novelty * novelty + self.freshness * freshness
    }
}

/// Partial preference payload; absent keys keep their stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub diversity: Option<f64>,
    #[serde(default)]
    pub novelty: Option<f64>,
    #[serde(default)]
    pub freshness: Option<f64>,
}

impl PreferenceUpdate {
    /// Merge over `weights`, clamping each supplied value into [0, 1].
    /// NaN carries no usable signal and leaves the stored weight untouched.
    pub fn merge_into(&self, weights: &mut PreferenceWeights) {
        fn merge(slot: &mut f64, value: Option<f64>) {
            if let Some(v) = value {
                if !v.is_nan() {
                    *slot = v.clamp(0.0, 1.0);
                }
            }
        }

        merge(&mut weights.diversity, self.diversity);
        merge(&mut weights.novelty, self.novelty);
        merge(&mut weights.freshness, self.freshness);
    }
}

/// Persisted personalization state for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVector {
    pub user_id: String,
    pub preferences: PreferenceWeights,
    /// Most recent first.
    #[serde(default)]
    pub reading_history: Vec<String>,
    #[serde(default)]
    pub topic_interests: HashMap<String, f64>,
    pub last_updated: DateTime<Utc>,
}

impl UserVector {
    pub fn with_defaults(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            preferences: PreferenceWeights::default(),
            reading_history: Vec::new(),
            topic_interests: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Article plus the oracle's per-axis scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedArticle {
    pub article: Article,
    pub original_rank: usize,
    #[serde(default)]
    pub diversity_score: f64,
    #[serde(default)]
    pub novelty_score: f64,
    #[serde(default)]
    pub freshness_score: f64,
    pub final_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandit_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisScores {
    pub diversity: f64,
    pub novelty: f64,
    pub freshness: f64,
}

/// One article's placement within a logged ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingDecision {
    #[serde(alias = "id")]
    pub article_id: String,
    pub title: String,
    pub original_rank: usize,
    pub personalized_rank: usize,
    pub diversity_score: f64,
    pub novelty_score: f64,
    pub freshness_score: f64,
    pub final_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingLogEntry {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub articles: Vec<RankingDecision>,
    pub user_preferences: PreferenceWeights,
}

/// Latest ranked list kept in the global ranking cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRankingResult {
    pub generated_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub articles: Vec<RankedArticle>,
}
