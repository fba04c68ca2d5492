use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub oracle: OracleConfig,
    pub source: SourceConfig,
    pub personalization: PersonalizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: usize,
    #[serde(default = "default_open_secs")]
    pub open_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_home_section")]
    pub home_section: String,
    #[serde(default = "default_popular_period")]
    pub popular_period: String,
    #[serde(default = "default_wire_sections")]
    pub wire_sections: Vec<String>,
}

/// What a repeated view of the same article does to the reading history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Prepend unconditionally; repeated views leave duplicate ids.
    #[default]
    KeepDuplicates,
    /// Drop any earlier occurrence before prepending.
    MoveToFront,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalizationConfig {
    #[serde(default = "default_merge_cap")]
    pub merge_cap: usize,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_vector_ttl_secs")]
    pub vector_ttl_secs: u64,
    #[serde(default = "default_log_ttl_secs")]
    pub log_ttl_secs: u64,
    #[serde(default = "default_log_index_cap")]
    pub log_index_cap: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_export_limit")]
    pub export_limit: usize,
    #[serde(default)]
    pub history_policy: HistoryPolicy,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            merge_cap: default_merge_cap(),
            history_cap: default_history_cap(),
            vector_ttl_secs: default_vector_ttl_secs(),
            log_ttl_secs: default_log_ttl_secs(),
            log_index_cap: default_log_index_cap(),
            cache_ttl_secs: default_cache_ttl_secs(),
            export_limit: default_export_limit(),
            history_policy: HistoryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app: envy::prefixed("APP_").from_env()?,
            store: envy::prefixed("STORE_").from_env()?,
            oracle: envy::prefixed("ORACLE_").from_env()?,
            source: envy::prefixed("SOURCE_").from_env()?,
            personalization: envy::prefixed("PERSONALIZATION_")
                .from_env::<PersonalizationConfig>()?
                .with_minimums(),
        })
    }
}

impl PersonalizationConfig {
    /// A zero TTL is rejected by `SETEX`, and a zero index cap would make
    /// `LTRIM 0 -1` keep the whole list.
    pub fn with_minimums(mut self) -> Self {
        self.log_index_cap = self.log_index_cap.max(1);
        self.vector_ttl_secs = self.vector_ttl_secs.max(1);
        self.log_ttl_secs = self.log_ttl_secs.max(1);
        self.cache_ttl_secs = self.cache_ttl_secs.max(1);
        self
    }
}

impl AppConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> String {
        format!("{},actix_web=info", self.log_level)
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_env() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_health_interval_secs() -> u64 {
    15
}

fn default_oracle_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_failure_threshold() -> usize {
    5
}

fn default_success_threshold() -> usize {
    2
}

fn default_open_secs() -> i64 {
    30
}

fn default_source_url() -> String {
    "https://api.nytimes.com/svc".to_string()
}

fn default_home_section() -> String {
    "home".to_string()
}

fn default_popular_period() -> String {
    "1".to_string()
}

fn default_wire_sections() -> Vec<String> {
    [
        "world",
        "us",
        "politics",
        "business",
        "technology",
        "science",
        "health",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_merge_cap() -> usize {
    50
}

fn default_history_cap() -> usize {
    100
}

fn default_vector_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_log_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_log_index_cap() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_export_limit() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personalization_defaults() {
        let config = PersonalizationConfig::default();
        assert_eq!(config.merge_cap, 50);
        assert_eq!(config.history_cap, 100);
        assert_eq!(config.vector_ttl_secs, 2_592_000);
        assert_eq!(config.log_ttl_secs, 604_800);
        assert_eq!(config.log_index_cap, 100);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.history_policy, HistoryPolicy::KeepDuplicates);
    }

    #[test]
    fn test_sections_from_iter() {
        let vars = vec![
            ("SOURCE_API_KEY".to_string(), "secret".to_string()),
            ("SOURCE_WIRE_SECTIONS".to_string(), "world,arts".to_string()),
        ];
        let source: SourceConfig = envy::prefixed("SOURCE_").from_iter(vars).unwrap();
        assert_eq!(source.api_key, "secret");
        assert_eq!(source.wire_sections, vec!["world", "arts"]);
        assert_eq!(source.home_section, "home");

        let vars = vec![(
            "PERSONALIZATION_HISTORY_POLICY".to_string(),
            "move_to_front".to_string(),
        )];
        let personalization: PersonalizationConfig =
            envy::prefixed("PERSONALIZATION_").from_iter(vars).unwrap();
        assert_eq!(personalization.history_policy, HistoryPolicy::MoveToFront);
        assert_eq!(personalization.export_limit, 50);

        let vars = vec![("APP_LOG_LEVEL".to_string(), "debug".to_string())];
        let app: AppConfig = envy::prefixed("APP_").from_iter(vars).unwrap();
        assert_eq!(app.default_filter(), "debug,actix_web=info");

        let vars = vec![("STORE_BACKEND".to_string(), "memory".to_string())];
        let store: StoreConfig = envy::prefixed("STORE_").from_iter(vars).unwrap();
        assert_eq!(store.backend, StoreBackend::Memory);
        assert_eq!(store.connect_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_caps_and_ttls_are_raised_to_one() {
        let vars = vec![
            ("PERSONALIZATION_LOG_INDEX_CAP".to_string(), "0".to_string()),
            ("PERSONALIZATION_LOG_TTL_SECS".to_string(), "0".to_string()),
            ("PERSONALIZATION_VECTOR_TTL_SECS".to_string(), "0".to_string()),
            ("PERSONALIZATION_CACHE_TTL_SECS".to_string(), "0".to_string()),
        ];
        let config = envy::prefixed("PERSONALIZATION_")
            .from_iter::<_, PersonalizationConfig>(vars)
            .unwrap()
            .with_minimums();

        assert_eq!(config.log_index_cap, 1);
        assert_eq!(config.log_ttl_secs, 1);
        assert_eq!(config.vector_ttl_secs, 1);
        assert_eq!(config.cache_ttl_secs, 1);
        assert_eq!(config.merge_cap, 50);
    }
}
