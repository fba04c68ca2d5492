//! Process-local store with Redis-like expiry semantics.
//!
//! Used for `STORE_BACKEND=memory` development runs and throughout the
//! tests. Expiry uses the tokio clock so paused-time tests can advance it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use super::{CappedAppend, KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum MemoryValue {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        key: &str,
        extract: impl FnOnce(&MemoryValue) -> StoreResult<T>,
    ) -> StoreResult<Option<T>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return extract(&entry.value).map(Some),
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    fn read_text(&self, key: &str) -> StoreResult<Option<String>> {
        self.read(key, |value| match value {
            MemoryValue::Text(text) => Ok(text.clone()),
            MemoryValue::List(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.read_text(key)
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        // Non-string values read as missing, matching MGET.
        Ok(keys
            .iter()
            .map(|key| self.read_text(key).ok().flatten())
            .collect())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn append_capped(&self, append: CappedAppend<'_>) -> StoreResult<()> {
        let now = Instant::now();

        let mut index = self
            .entries
            .entry(append.index_key.to_string())
            .or_insert_with(|| MemoryEntry {
                value: MemoryValue::List(VecDeque::new()),
                expires_at: None,
            });

        if index.is_expired(now) {
            index.value = MemoryValue::List(VecDeque::new());
        }

        match &mut index.value {
            MemoryValue::List(list) => {
                list.push_front(append.item_key.to_string());
                list.truncate(append.index_cap);
            }
            MemoryValue::Text(_) => return Err(StoreError::WrongType(append.index_key.to_string())),
        }
        index.expires_at = Some(now + Duration::from_secs(append.index_ttl_secs));
        drop(index);

        self.entries.insert(
            append.item_key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(append.value.to_string()),
                expires_at: Some(now + Duration::from_secs(append.item_ttl_secs)),
            },
        );
        Ok(())
    }

    async fn list_head(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        let head = self.read(key, |value| match value {
            MemoryValue::List(list) => Ok(list.iter().take(count).cloned().collect()),
            MemoryValue::Text(_) => Err(StoreError::WrongType(key.to_string())),
        })?;
        Ok(head.unwrap_or_default())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
