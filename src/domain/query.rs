//! Query text normalization.
//!
//! Two forms are used: the *trimmed* query is what callers see echoed back and
//! what the generator receives; the *normalized* query additionally folds case
//! and is the only input to cache key derivation.

/// Strip leading and trailing whitespace.
pub fn trim_query(raw: &str) -> &str {
    raw.trim()
}

/// Canonical form used for cache identity.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}
