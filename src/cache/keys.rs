//! Cache key derivation.
//!
//! Keys are `"<namespace>:<sha256-hex>"` over the normalized query bytes. Both
//! the namespace and the digest are fixed so keys stay stable across restarts
//! and deployments.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::query::normalize_query;

/// Prefix isolating this service's entries in a shared store.
pub const KEY_NAMESPACE: &str = "chatbot:query";

/// Fully-qualified key of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the cache key for a raw query.
pub fn derive_key(query: &str) -> CacheKey {
    let normalized = normalize_query(query);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    CacheKey(format!("{KEY_NAMESPACE}:{}", hex::encode(hasher.finalize())))
}

/// Glob pattern matching every key below `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    format!("{}:*", prefix.trim_end_matches(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive_key("What is Rust?"), derive_key("What is Rust?"));
    }

    #[test]
    fn normalization_equivalence() {
        assert_eq!(derive_key(" Hello "), derive_key("hello"));
        assert_eq!(derive_key("HELLO"), derive_key("hello\n"));
    }

    #[test]
    fn distinct_queries_produce_distinct_keys() {
        assert_ne!(derive_key("page one"), derive_key("page two"));
    }

    #[test]
    fn key_is_namespaced_fixed_length_hex() {
        let key = derive_key("anything");
        let digest = key
            .as_str()
            .strip_prefix("chatbot:query:")
            .expect("namespaced key");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_stable_across_processes() {
        // sha256("hello")
        assert_eq!(
            derive_key("Hello").as_str(),
            "chatbot:query:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn prefix_pattern_tolerates_trailing_separator() {
        assert_eq!(prefix_pattern("chatbot:query"), "chatbot:query:*");
        assert_eq!(prefix_pattern("chatbot:query:"), "chatbot:query:*");
    }
}
