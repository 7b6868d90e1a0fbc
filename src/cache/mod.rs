//! Response cache.
//!
//! Generated answers are stored under a key derived from the normalized query
//! and expire after a fixed lifetime. Backends report failures explicitly;
//! [`ResponseCache`] turns every failure into a miss so a degraded store never
//! fails a request.
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! host = "localhost"
//! port = 6379
//! expiration_seconds = 600
//! ```

mod backend;
mod config;
mod error;
mod keys;
pub(crate) mod lock;
mod store;

pub use backend::{CacheBackend, MemoryBackend};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, KEY_NAMESPACE, derive_key, prefix_pattern};
pub use store::ResponseCache;
