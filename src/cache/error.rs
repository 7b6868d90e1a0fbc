use std::time::Duration;

use thiserror::Error;

/// Failure reported by a cache backend.
///
/// Backends return these explicitly; [`super::ResponseCache`] decides how each
/// one degrades.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache operation `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn timeout(op: &'static str, after: Duration) -> Self {
        Self::Timeout { op, after }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Short label used as a metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Redis(_) => "redis",
            CacheError::Timeout { .. } => "timeout",
            CacheError::Serialization(_) => "serialization",
            CacheError::Unavailable(_) => "unavailable",
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
