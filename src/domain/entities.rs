//! Domain entities exchanged between the cache, the generator and callers.

use serde::{Deserialize, Serialize};

/// Value stored under a cache key.
///
/// `query` is the trimmed query as the caller sent it (case preserved); it is
/// kept for observability only and plays no part in lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub response: String,
}

impl CacheEntry {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

/// Outcome of a single chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResult {
    pub query: String,
    pub response: String,
    pub served_from_cache: bool,
    /// Wall-clock seconds spent handling the query, rounded to milliseconds.
    pub elapsed_seconds: f64,
}
