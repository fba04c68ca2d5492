use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CappedAppend, KeyValueStore, StoreError, StoreResult};

/// Redis-backed store over a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect, bounding both the initial connection and every later
    /// command by `timeout`.
    pub async fn connect(redis_url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;

        let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        debug!("Redis connection manager initialized");
        Ok(Self {
            manager,
            op_timeout: timeout,
        })
    }

    async fn run<T>(&self, op: &str, fut: impl Future<Output = RedisResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Redis {} failed: {}", op, e);
                Err(StoreError::Redis(e))
            }
            Err(_) => {
                warn!("Redis {} timed out after {:?}", op, self.op_timeout);
                Err(StoreError::Timeout(self.op_timeout))
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.run(
            "GET",
            redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<String>>(&mut conn),
        )
        .await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        self.run(
            "MGET",
            redis::cmd("MGET")
                .arg(keys)
                .query_async::<_, Vec<Option<String>>>(&mut conn),
        )
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        self.run(
            "SETEX",
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_secs)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn append_capped(&self, append: CappedAppend<'_>) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        // MULTI/EXEC: the body and its index slot land together or not at all.
        pipe.atomic()
            .cmd("SETEX")
            .arg(append.item_key)
            .arg(append.item_ttl_secs)
            .arg(append.value)
            .ignore()
            .cmd("LPUSH")
            .arg(append.index_key)
            .arg(append.item_key)
            .ignore()
            .cmd("LTRIM")
            .arg(append.index_key)
            .arg(0)
            .arg(append.index_cap as i64 - 1)
            .ignore()
            .cmd("EXPIRE")
            .arg(append.index_key)
            .arg(append.index_ttl_secs)
            .ignore();

        self.run("MULTI", pipe.query_async::<_, ()>(&mut conn)).await
    }

    async fn list_head(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        self.run(
            "LRANGE",
            redis::cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(count as i64 - 1)
                .query_async::<_, Vec<String>>(&mut conn),
        )
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // SCAN instead of KEYS to avoid blocking Redis
        let pattern = format!("{}*", prefix);
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .run(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may report a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        self.run(
            "PING",
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}
