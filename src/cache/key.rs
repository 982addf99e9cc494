//! Deterministic cache keys
//!
//! Keys are blake3 hashes of the normalized question text, the sorted filter
//! pairs, and a namespace-specific salt, so the same question never collides
//! across namespaces and filter order never matters.

use crate::cache::Namespace;

/// A deterministic cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from normalized text plus sorted filter pairs
    pub fn new(namespace: Namespace, text: &str, filters: &[(String, String)]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.salt().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalize(text).as_bytes());

        let mut sorted: Vec<&(String, String)> = filters.iter().collect();
        sorted.sort();
        for (k, v) in sorted {
            hasher.update(b"\x1f");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }

        Self(hasher.finalize().to_hex().to_string())
    }

    /// Build a key from arbitrary string parts (e.g. question + top_k + effort)
    pub fn from_parts(namespace: Namespace, parts: &[&str]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.salt().as_bytes());
        for part in parts {
            hasher.update(b"\x1f");
            hasher.update(normalize(part).as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lowercase, trim, and collapse internal whitespace so textual variants of
/// the same question share a key
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
