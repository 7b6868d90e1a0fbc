//! Degrade-on-error facade over a [`CacheBackend`].
//!
//! Nothing here returns an error: a failed read is a miss, a failed write is
//! "not stored", and a failed purge removed nothing. Every degraded outcome is
//! logged and counted.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::entities::CacheEntry;

use super::backend::CacheBackend;
use super::error::CacheError;
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";

#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Open the shared connection. Idempotent; `false` means the backend is unreachable.
    pub async fn connect(&self) -> bool {
        match self.backend.connect().await {
            Ok(()) => true,
            Err(err) => {
                record_error("connect", &err);
                false
            }
        }
    }

    /// Look up a cached response. Unreachable backends and undecodable payloads are misses.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let raw = match self.backend.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!("chatcache_cache_miss_total").increment(1);
                return None;
            }
            Err(err) => {
                record_error("get", &err);
                counter!("chatcache_cache_miss_total").increment(1);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.response.is_empty() => {
                counter!("chatcache_cache_hit_total").increment(1);
                Some(entry)
            }
            Ok(_) => {
                debug!(
                    target = SOURCE,
                    key = %key,
                    "Ignoring cached entry with empty response"
                );
                counter!("chatcache_cache_miss_total").increment(1);
                None
            }
            Err(err) => {
                record_error("decode", &CacheError::from(err));
                counter!("chatcache_cache_miss_total").increment(1);
                None
            }
        }
    }

    /// Store `entry` under `key` for `ttl`. Returns whether the write landed.
    pub async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> bool {
        let payload = match serde_json::to_string(entry) {
            Ok(payload) => payload,
            Err(err) => {
                record_error("encode", &CacheError::from(err));
                return false;
            }
        };

        match self.backend.set(key.as_str(), &payload, ttl).await {
            Ok(()) => {
                counter!("chatcache_cache_store_total").increment(1);
                true
            }
            Err(err) => {
                record_error("set", &err);
                false
            }
        }
    }

    /// Delete every entry under `prefix`. Returns the number removed, 0 on failure.
    pub async fn clear(&self, prefix: &str) -> usize {
        match self.backend.clear_prefix(prefix).await {
            Ok(removed) => {
                debug!(target = SOURCE, prefix, removed, "Cleared cache prefix");
                removed
            }
            Err(err) => {
                record_error("clear", &err);
                0
            }
        }
    }

    /// Release the shared connection. Later calls reconnect lazily.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

fn record_error(op: &'static str, err: &CacheError) {
    warn!(
        target = SOURCE,
        op,
        kind = err.kind(),
        error = %err,
        "Cache operation degraded"
    );
    counter!("chatcache_cache_error_total", "op" => op).increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::error::CacheResult;
    use crate::cache::keys::{KEY_NAMESPACE, derive_key};

    const TTL: Duration = Duration::from_secs(600);

    /// Backend whose every operation fails.
    #[derive(Default)]
    struct BrokenBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn connect(&self) -> CacheResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::unavailable("connection refused"))
        }

        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::timeout("get", Duration::from_secs(5)))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::unavailable("connection refused"))
        }

        async fn clear_prefix(&self, _prefix: &str) -> CacheResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::unavailable("connection refused"))
        }

        async fn close(&self) {}

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn memory_cache() -> (Arc<MemoryBackend>, ResponseCache) {
        let backend = Arc::new(MemoryBackend::new());
        let cache = ResponseCache::new(backend.clone());
        (backend, cache)
    }

    #[tokio::test]
    async fn stored_entry_round_trips() {
        let (_, cache) = memory_cache();
        let key = derive_key("What is Rust?");
        let entry = CacheEntry::new("What is Rust?", "A systems language.");

        assert!(cache.set(&key, &entry, TTL).await);
        assert_eq!(cache.get(&key).await, Some(entry));
    }

    #[tokio::test]
    async fn equivalent_queries_share_an_entry() {
        let (_, cache) = memory_cache();
        let entry = CacheEntry::new("Hello", "Hi there");
        assert!(cache.set(&derive_key(" Hello "), &entry, TTL).await);
        assert_eq!(cache.get(&derive_key("hello")).await, Some(entry));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss() {
        let (_, cache) = memory_cache();
        let key = derive_key("short lived");
        let entry = CacheEntry::new("short lived", "soon gone");
        assert!(cache.set(&key, &entry, Duration::from_secs(1)).await);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let (backend, cache) = memory_cache();
        let key = derive_key("corrupt");
        backend.set(key.as_str(), "{not json", TTL).await.unwrap();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn empty_response_is_a_miss() {
        let (backend, cache) = memory_cache();
        let key = derive_key("blank");
        backend
            .set(key.as_str(), r#"{"query":"blank","response":""}"#, TTL)
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn clear_removes_namespace_entries() {
        let (backend, cache) = memory_cache();
        for query in ["one", "two", "three"] {
            let entry = CacheEntry::new(query, format!("answer {query}"));
            assert!(cache.set(&derive_key(query), &entry, TTL).await);
        }

        assert_eq!(cache.clear(KEY_NAMESPACE).await, 3);
        assert!(backend.is_empty());
        assert_eq!(cache.get(&derive_key("one")).await, None);
    }

    #[tokio::test]
    async fn backend_failures_degrade_instead_of_propagating() {
        let backend = Arc::new(BrokenBackend::default());
        let cache = ResponseCache::new(backend.clone());
        let key = derive_key("anything");

        assert!(!cache.connect().await);
        assert_eq!(cache.get(&key).await, None);
        assert!(!cache.set(&key, &CacheEntry::new("anything", "x"), TTL).await);
        assert_eq!(cache.clear(KEY_NAMESPACE).await, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn memory_backend_connects_immediately() {
        let (_, cache) = memory_cache();
        assert!(cache.connect().await);
        assert!(cache.connect().await);
        assert_eq!(cache.backend_name(), "memory");
    }
}
