//! Multi-tier TTL cache for the query pipeline
//!
//! Four independently-TTL'd namespaces: embedding vectors, vector-search
//! results, structured-query results, and final answer payloads. All
//! operations are best-effort: a miss or an expired entry degrades to direct
//! computation, never to a request failure.

mod key;

pub use key::CacheKey;

use crate::config::CacheConfig;
use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cache namespace with an independent default TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Embedding vectors (input-deterministic, longest TTL)
    Embedding,
    /// Vector-search results (index can change out of band, shortest TTL)
    Search,
    /// Structured-query results from the analytics engine
    Structured,
    /// Final answer payloads
    Answer,
}

impl Namespace {
    /// Key salt keeping identical inputs distinct across namespaces
    pub fn salt(&self) -> &'static str {
        match self {
            Namespace::Embedding => "embedding",
            Namespace::Search => "search",
            Namespace::Structured => "structured",
            Namespace::Answer => "answer",
        }
    }

    pub const ALL: [Namespace; 4] = [
        Namespace::Embedding,
        Namespace::Search,
        Namespace::Structured,
        Namespace::Answer,
    ];
}

/// A stored entry; overwritten whole on recomputation, never patched
struct CacheEntry {
    value: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

struct NamespaceStore {
    entries: RwLock<AHashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NamespaceStore {
    fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// Per-namespace cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct NamespaceStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Multi-tier in-process cache
pub struct TieredCache {
    enabled: bool,
    embedding: NamespaceStore,
    search: NamespaceStore,
    structured: NamespaceStore,
    answer: NamespaceStore,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            embedding: NamespaceStore::new(Duration::from_secs(config.embedding_ttl_secs)),
            search: NamespaceStore::new(Duration::from_secs(config.search_ttl_secs)),
            structured: NamespaceStore::new(Duration::from_secs(config.structured_ttl_secs)),
            answer: NamespaceStore::new(Duration::from_secs(config.answer_ttl_secs)),
        }
    }

    fn store(&self, namespace: Namespace) -> &NamespaceStore {
        match namespace {
            Namespace::Embedding => &self.embedding,
            Namespace::Search => &self.search,
            Namespace::Structured => &self.structured,
            Namespace::Answer => &self.answer,
        }
    }

    /// Get raw bytes for a key; an entry past its TTL is a miss, not a
    /// stale hit, and is removed on the way out.
    pub fn get(&self, namespace: Namespace, key: &CacheKey) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }

        let store = self.store(namespace);

        let expired = {
            let entries = match store.entries.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match entries.get(key.as_str()) {
                Some(entry) if !entry.is_expired() => {
                    store.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = match store.entries.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Recheck under the write lock; a concurrent put may have
            // refreshed the entry.
            if entries.get(key.as_str()).is_some_and(|e| e.is_expired()) {
                entries.remove(key.as_str());
            }
        }

        store.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store raw bytes under a key. Last write wins.
    pub fn put(&self, namespace: Namespace, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let store = self.store(namespace);
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl: ttl.unwrap_or(store.default_ttl),
        };

        let mut entries = match store.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.as_str().to_string(), entry);
    }

    /// Typed get via JSON deserialization. Malformed stored data is treated
    /// as a miss and evicted.
    pub fn get_json<T: DeserializeOwned>(&self, namespace: Namespace, key: &CacheKey) -> Option<T> {
        let bytes = self.get(namespace, key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    "Evicting malformed cache entry in {:?}: {}",
                    namespace,
                    e
                );
                self.remove(namespace, key);
                None
            }
        }
    }

    /// Typed put via JSON serialization. Serialization failure is logged and
    /// dropped; caching is never allowed to fail a request.
    pub fn put_json<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.put(namespace, key, bytes, ttl),
            Err(e) => tracing::warn!("Failed to serialize cache value for {:?}: {}", namespace, e),
        }
    }

    fn remove(&self, namespace: Namespace, key: &CacheKey) {
        let store = self.store(namespace);
        let mut entries = match store.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key.as_str());
    }

    /// Clear one namespace
    pub fn invalidate(&self, namespace: Namespace) -> usize {
        let store = self.store(namespace);
        let mut entries = match store.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = entries.len();
        entries.clear();
        tracing::info!("Invalidated {} entries in {:?}", count, namespace);
        count
    }

    /// Clear every namespace except embeddings, which are the most
    /// expensive payloads to regenerate.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate(Namespace::Search)
            + self.invalidate(Namespace::Structured)
            + self.invalidate(Namespace::Answer)
    }

    /// Clear every namespace, embeddings included
    pub fn invalidate_everything(&self) -> usize {
        self.invalidate_all() + self.invalidate(Namespace::Embedding)
    }

    /// Statistics for one namespace
    pub fn namespace_stats(&self, namespace: Namespace) -> NamespaceStats {
        let store = self.store(namespace);
        let entries = match store.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        let hits = store.hits.load(Ordering::Relaxed);
        let misses = store.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        NamespaceStats {
            entries,
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn test_cache() -> TieredCache {
        TieredCache::new(&CacheConfig {
            enabled: true,
            embedding_ttl_secs: 3600,
            search_ttl_secs: 3600,
            structured_ttl_secs: 3600,
            answer_ttl_secs: 3600,
        })
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = test_cache();
        let key = CacheKey::new(Namespace::Answer, "how many candidates", &[]);

        cache.put_json(Namespace::Answer, &key, &"forty-two".to_string(), None);
        let value: Option<String> = cache.get_json(Namespace::Answer, &key);
        assert_eq!(value.as_deref(), Some("forty-two"));
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let cache = test_cache();
        let key = CacheKey::new(Namespace::Search, "q", &[]);

        cache.put(
            Namespace::Search,
            &key,
            vec![1, 2, 3],
            Some(Duration::from_millis(10)),
        );
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.get(Namespace::Search, &key).is_none());
    }

    #[test]
    fn test_overwrite_wins() {
        let cache = test_cache();
        let key = CacheKey::new(Namespace::Structured, "count", &[]);

        cache.put_json(Namespace::Structured, &key, &1u64, None);
        cache.put_json(Namespace::Structured, &key, &2u64, None);

        let value: Option<u64> = cache.get_json(Namespace::Structured, &key);
        assert_eq!(value, Some(2));
    }

    #[test]
    fn test_invalidate_all_preserves_embeddings() {
        let cache = test_cache();
        let emb_key = CacheKey::new(Namespace::Embedding, "text", &[]);
        let ans_key = CacheKey::new(Namespace::Answer, "text", &[]);

        cache.put_json(Namespace::Embedding, &emb_key, &vec![0.1f32, 0.2], None);
        cache.put_json(Namespace::Answer, &ans_key, &"x".to_string(), None);

        cache.invalidate_all();

        let emb: Option<Vec<f32>> = cache.get_json(Namespace::Embedding, &emb_key);
        let ans: Option<String> = cache.get_json(Namespace::Answer, &ans_key);
        assert!(emb.is_some());
        assert!(ans.is_none());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = TieredCache::new(&CacheConfig {
            enabled: false,
            embedding_ttl_secs: 3600,
            search_ttl_secs: 3600,
            structured_ttl_secs: 3600,
            answer_ttl_secs: 3600,
        });
        let key = CacheKey::new(Namespace::Answer, "q", &[]);

        cache.put_json(Namespace::Answer, &key, &"v".to_string(), None);
        let value: Option<String> = cache.get_json(Namespace::Answer, &key);
        assert!(value.is_none());
    }

    #[test]
    fn test_hit_rate_tracking() {
        let cache = test_cache();
        let key = CacheKey::new(Namespace::Answer, "q", &[]);

        cache.put_json(Namespace::Answer, &key, &"v".to_string(), None);
        let _: Option<String> = cache.get_json(Namespace::Answer, &key);
        let miss_key = CacheKey::new(Namespace::Answer, "other", &[]);
        let _: Option<String> = cache.get_json(Namespace::Answer, &miss_key);

        let stats = cache.namespace_stats(Namespace::Answer);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
