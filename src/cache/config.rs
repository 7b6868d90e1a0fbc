//! Cache configuration.
//!
//! Derived from the `[cache]` section of the settings.

use std::time::Duration;

use crate::config::{CacheBackendKind, CacheSettings};

const DEFAULT_EXPIRATION_SECS: u64 = 600;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// `redis://host:port/db` connection string.
    pub redis_url: String,
    /// Lifetime of a stored response.
    pub expiration: Duration,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            redis_url: redis_url("localhost", 6379, 0),
            expiration: Duration::from_secs(DEFAULT_EXPIRATION_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            redis_url: redis_url(&settings.host, settings.port, settings.db),
            expiration: settings.expiration,
            connect_timeout: settings.connect_timeout,
            operation_timeout: settings.operation_timeout,
        }
    }
}

fn redis_url(host: &str, port: u16, db: u32) -> String {
    format!("redis://{host}:{port}/{db}")
}
