//! Storage backends behind [`super::ResponseCache`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::CacheResult;
use super::keys::prefix_pattern;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::backend";

/// Async key/value store with per-entry expiry.
///
/// Implementations report every failure; callers decide whether to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Establish the shared connection if it is not already open.
    async fn connect(&self) -> CacheResult<()>;
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    /// Store `value` so that it expires after `ttl`. Replaces any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;
    /// Delete every key under `prefix`, returning how many were removed.
    async fn clear_prefix(&self, prefix: &str) -> CacheResult<usize>;
    /// Drop the shared connection; the next operation reconnects.
    async fn close(&self);
    fn name(&self) -> &'static str;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local backend used for development runs and tests.
///
/// Expiry follows the tokio clock, so paused-time tests can advance past a TTL
/// without sleeping.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn connect(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = rw_write(&self.entries, SOURCE, "get_expire");
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = prefix_pattern(prefix);
        let stem = pattern.trim_end_matches('*');
        let now = Instant::now();

        let mut entries = rw_write(&self.entries, SOURCE, "clear_prefix");
        let before = entries.len();
        let mut expired = 0;
        entries.retain(|key, entry| {
            if !key.starts_with(stem) {
                return true;
            }
            if !entry.is_live(now) {
                expired += 1;
            }
            false
        });
        Ok(before - entries.len() - expired)
    }

    async fn close(&self) {}

    fn name(&self) -> &'static str {
        "memory"
    }
}
