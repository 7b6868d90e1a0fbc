//! Cache-aside chat orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use tracing::info;

use crate::{
    cache::{KEY_NAMESPACE, ResponseCache, derive_key},
    domain::{
        entities::{CacheEntry, ChatResult},
        query::trim_query,
    },
};

use super::generation::ResponseGenerator;

const SOURCE: &str = "application::chat";

/// Answers queries from the cache when possible and generates (then stores)
/// an answer otherwise. Holds no per-request state.
#[derive(Clone)]
pub struct ChatService {
    cache: ResponseCache,
    generator: Arc<dyn ResponseGenerator>,
    ttl: Duration,
}

impl ChatService {
    pub fn new(cache: ResponseCache, generator: Arc<dyn ResponseGenerator>, ttl: Duration) -> Self {
        Self {
            cache,
            generator,
            ttl,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Handle one query. Never fails: cache and generation problems degrade to
    /// a miss and a fallback answer respectively.
    pub async fn handle(&self, query: &str) -> ChatResult {
        let query = trim_query(query);
        let started = Instant::now();
        let key = derive_key(query);

        if let Some(entry) = self.cache.get(&key).await {
            let elapsed = started.elapsed();
            info!(
                target = SOURCE,
                key = %key,
                elapsed_ms = elapsed.as_millis() as u64,
                "Serving cached response"
            );
            return self.finish(query, entry.response, true, elapsed);
        }

        let response = self.generator.generate(query).await;
        let entry = CacheEntry::new(query, response);
        let stored = self.cache.set(&key, &entry, self.ttl).await;

        let elapsed = started.elapsed();
        info!(
            target = SOURCE,
            key = %key,
            stored,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generated fresh response"
        );
        self.finish(query, entry.response, false, elapsed)
    }

    /// Remove every cached answer. Returns how many entries were deleted.
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear(KEY_NAMESPACE).await
    }

    /// Release the cache connection.
    pub async fn shutdown(&self) {
        self.cache.close().await;
    }

    fn finish(
        &self,
        query: &str,
        response: String,
        served_from_cache: bool,
        elapsed: Duration,
    ) -> ChatResult {
        let outcome = if served_from_cache { "hit" } else { "miss" };
        histogram!("chatcache_chat_handle_ms", "outcome" => outcome)
            .record(elapsed.as_secs_f64() * 1000.0);

        ChatResult {
            query: query.to_string(),
            response,
            served_from_cache,
            elapsed_seconds: round_millis(elapsed),
        }
    }
}

/// Seconds rounded to three decimal places.
pub fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
