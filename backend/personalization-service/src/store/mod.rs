//! Key/value store handle shared by the stateful components.
//!
//! The handle is constructed once in `main` and injected into the user
//! vector store, ranking cache and ranking log store. It owns the
//! connection lifecycle and tracks health so callers never need to know
//! whether Redis is reachable: reads fall back to defaults and writes
//! report `WriteOutcome::DegradedLocalOnly`.

mod keys;
mod memory;
mod redis_store;

pub use keys::{StoreKey, CACHED_RANKING_PREFIX};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::metrics;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type for key {0}")]
    WrongType(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a best-effort write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Persisted,
    /// The write was dropped; only the in-request copy exists.
    DegradedLocalOnly,
}

impl WriteOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, WriteOutcome::Persisted)
    }

    /// Collapse a store result into an outcome, reporting failures through
    /// logs and metrics only.
    pub fn settle(component: &'static str, key: &str, result: StoreResult<()>) -> Self {
        match result {
            Ok(()) => {
                metrics::record_store_write(component, "persisted");
                WriteOutcome::Persisted
            }
            Err(e) => {
                warn!(component, key = %key, error = %e, "Store write dropped");
                metrics::record_store_write(component, "degraded");
                WriteOutcome::DegradedLocalOnly
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreHealth {
    Connected,
    /// Connected, but the most recent operation failed.
    Degraded,
    Disconnected,
}

impl StoreHealth {
    fn to_u8(self) -> u8 {
        match self {
            StoreHealth::Connected => 0,
            StoreHealth::Degraded => 1,
            StoreHealth::Disconnected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => StoreHealth::Connected,
            1 => StoreHealth::Degraded,
            _ => StoreHealth::Disconnected,
        }
    }
}

/// Body write plus bounded index push, applied as one unit.
#[derive(Debug, Clone, Copy)]
pub struct CappedAppend<'a> {
    pub item_key: &'a str,
    pub value: &'a str,
    pub item_ttl_secs: u64,
    pub index_key: &'a str,
    pub index_cap: usize,
    pub index_ttl_secs: u64,
}

/// Operations the stateful components need from a backing store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Values for `keys`, positionally; missing keys yield `None`.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Write `item_key`, push it onto the front of `index_key` and trim the
    /// index to `index_cap` entries.
    async fn append_capped(&self, append: CappedAppend<'_>) -> StoreResult<()>;

    /// First `count` entries of a list.
    async fn list_head(&self, key: &str, count: usize) -> StoreResult<Vec<String>>;

    /// Live keys starting with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    async fn ping(&self) -> StoreResult<()>;
}

enum Connector {
    Redis { url: String, timeout: Duration },
    Fixed(Arc<dyn KeyValueStore>),
}

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Explicitly constructed store handle with connect/disconnect lifecycle.
pub struct StoreHandle {
    connector: Connector,
    backend: RwLock<Option<Arc<dyn KeyValueStore>>>,
    health: AtomicU8,
    closed: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
}

impl StoreHandle {
    /// Handle for a Redis server. Starts disconnected; call `connect`.
    pub fn redis(url: &str, connect_timeout: Duration) -> Self {
        Self::from_connector(Connector::Redis {
            url: url.to_string(),
            timeout: connect_timeout,
        })
    }

    /// Handle over a process-local store, already connected.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryStore::new()))
    }

    /// Handle over an arbitrary backend, already connected.
    pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
        let mut handle = Self::from_connector(Connector::Fixed(backend.clone()));
        handle.backend = RwLock::new(Some(backend));
        handle.health = AtomicU8::new(StoreHealth::Connected.to_u8());
        handle
    }

    fn from_connector(connector: Connector) -> Self {
        Self {
            connector,
            backend: RwLock::new(None),
            health: AtomicU8::new(StoreHealth::Disconnected.to_u8()),
            closed: AtomicBool::new(false),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn health(&self) -> StoreHealth {
        StoreHealth::from_u8(self.health.load(Ordering::Relaxed))
    }

    fn set_health(&self, health: StoreHealth) {
        let previous = StoreHealth::from_u8(self.health.swap(health.to_u8(), Ordering::Relaxed));
        if previous != health {
            info!(from = ?previous, to = ?health, "Store health changed");
            metrics::set_store_health(health);
        }
    }

    /// Establish the backend connection.
    pub async fn connect(&self) -> StoreResult<()> {
        self.closed.store(false, Ordering::Relaxed);
        *self.last_attempt.lock().await = Some(Instant::now());

        let backend: Arc<dyn KeyValueStore> = match &self.connector {
            Connector::Redis { url, timeout } => match RedisStore::connect(url, *timeout).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis");
                    self.set_health(StoreHealth::Disconnected);
                    return Err(e);
                }
            },
            Connector::Fixed(backend) => backend.clone(),
        };

        *self.backend.write().await = Some(backend);
        self.set_health(StoreHealth::Connected);
        info!("Store connected");
        Ok(())
    }

    /// Drop the backend connection. Later operations fail as unavailable
    /// until `connect` is called again.
    pub async fn disconnect(&self) {
        self.closed.store(true, Ordering::Relaxed);
        *self.backend.write().await = None;
        self.set_health(StoreHealth::Disconnected);
        info!("Store disconnected");
    }

    async fn ensure_connected(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        if let Some(backend) = self.backend.read().await.as_ref() {
            return Ok(backend.clone());
        }

        if self.closed.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("store handle is closed".to_string()));
        }

        {
            let last_attempt = self.last_attempt.lock().await;
            if let Some(at) = *last_attempt {
                if at.elapsed() < RECONNECT_BACKOFF {
                    return Err(StoreError::Unavailable(
                        "store disconnected; reconnect backing off".to_string(),
                    ));
                }
            }
        }

        self.connect().await?;
        self.backend
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("store disconnected".to_string()))
    }

    fn observe<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) => self.set_health(StoreHealth::Connected),
            Err(_) => self.set_health(StoreHealth::Degraded),
        }
        result
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let backend = self.ensure_connected().await?;
        self.observe(backend.get(key).await)
    }

    pub async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let backend = self.ensure_connected().await?;
        self.observe(backend.get_many(keys).await)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let backend = self.ensure_connected().await?;
        self.observe(backend.set_ex(key, value, ttl_secs).await)
    }

    pub async fn append_capped(&self, append: CappedAppend<'_>) -> StoreResult<()> {
        let backend = self.ensure_connected().await?;
        self.observe(backend.append_capped(append).await)
    }

    pub async fn list_head(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let backend = self.ensure_connected().await?;
        self.observe(backend.list_head(key, count).await)
    }

    pub async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let backend = self.ensure_connected().await?;
        self.observe(backend.scan_prefix(prefix).await)
    }

    /// Probe the backend, reconnecting if needed.
    pub async fn ping(&self) -> StoreResult<()> {
        let backend = self.ensure_connected().await?;
        self.observe(backend.ping().await)
    }
}
