//! Redis-backed [`CacheBackend`].

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::cache::{
    CacheBackend, CacheConfig, CacheError, CacheResult,
    lock::{rw_read, rw_write},
    prefix_pattern,
};

const SOURCE: &str = "infra::redis";
const SCAN_BATCH: usize = 500;

type SharedConnection = Arc<OnceCell<ConnectionManager>>;

/// Lazily-connected Redis store. One [`ConnectionManager`] is shared by every
/// caller; [`CacheBackend::close`] drops it and the next call reconnects.
pub struct RedisBackend {
    client: redis::Client,
    connection: RwLock<SharedConnection>,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl RedisBackend {
    /// Validate the connection URL. No network traffic happens until first use.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            connection: RwLock::new(Arc::new(OnceCell::new())),
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
        })
    }

    /// Whether a shared connection is currently held.
    pub fn is_connected(&self) -> bool {
        rw_read(&self.connection, SOURCE, "is_connected").initialized()
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let cell = rw_read(&self.connection, SOURCE, "connection").clone();
        let manager = cell
            .get_or_try_init(|| async {
                // A refused connection fails at once instead of backing off.
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(0)
                    .set_connection_timeout(self.connect_timeout)
                    .set_response_timeout(self.operation_timeout);
                let manager = match tokio::time::timeout(
                    self.connect_timeout,
                    ConnectionManager::new_with_config(self.client.clone(), config),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(CacheError::timeout("connect", self.connect_timeout)),
                };
                info!(target = SOURCE, "Connected to Redis");
                Ok(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::timeout(op, self.operation_timeout)),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn connect(&self) -> CacheResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        self.bounded("get", async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        self.bounded("set", async move {
            let () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn clear_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let pattern = prefix_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    "scan",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            if !keys.is_empty() {
                let deleted: usize = self
                    .bounded(
                        "delete",
                        redis::cmd("DEL").arg(keys.as_slice()).query_async(&mut conn),
                    )
                    .await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(target = SOURCE, pattern = %pattern, removed, "Scanned and deleted keys");
        Ok(removed)
    }

    async fn close(&self) {
        let previous = std::mem::replace(
            &mut *rw_write(&self.connection, SOURCE, "close"),
            Arc::new(OnceCell::new()),
        );
        if previous.initialized() {
            info!(target = SOURCE, "Released Redis connection");
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
