//! Connector result cache with TTL
//!
//! Data connectors key cached results by the rendered query statement. The
//! cache is shared by concurrent requests and bounded by both a time-to-live
//! and a maximum entry count.

use blake3::Hasher;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use attrflow_core::AttributeMap;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached statements
    pub capacity: usize,

    /// Time-to-live of a cached result in seconds
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 4 * 60 * 60,
        }
    }
}

/// Cache key type (BLAKE3 hash of the statement)
type CacheKey = [u8; 32];

#[derive(Clone)]
struct CachedEntry {
    attributes: AttributeMap,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(attributes: AttributeMap) -> Self {
        Self {
            attributes,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Statement-keyed cache of connector results
pub struct ResultCache {
    entries: DashMap<CacheKey, CachedEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Cached result for a statement, if present and unexpired
    pub fn get(&self, statement: &str) -> Option<AttributeMap> {
        let key = Self::compute_key(statement);

        if let Some(entry) = self.entries.get(&key) {
            if entry.is_expired(self.config.ttl()) {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.attributes.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result, evicting if the cache is full
    pub fn put(&self, statement: &str, attributes: AttributeMap) {
        if self.config.capacity == 0 {
            return;
        }

        let key = Self::compute_key(statement);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict();
        }
        self.entries.insert(key, CachedEntry::new(attributes));
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    fn compute_key(statement: &str) -> CacheKey {
        let mut hasher = Hasher::new();
        hasher.update(statement.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Drop expired entries, then the oldest one if still full
    fn evict(&self) {
        let ttl = self.config.ttl();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));

        if self.entries.len() >= self.config.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().cached_at)
                .map(|entry| *entry.key());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
        debug!("Result cache evicted down to {} entries", self.entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrflow_core::Attribute;

    fn result(value: &str) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert("uid".to_string(), Attribute::with_values("uid", [value]));
        map
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ResultCache::new(CacheConfig::default());
        assert!(cache.get("(uid=jdoe)").is_none());

        cache.put("(uid=jdoe)", result("jdoe"));
        assert_eq!(cache.get("(uid=jdoe)"), Some(result("jdoe")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResultCache::new(CacheConfig {
            capacity: 10,
            ttl_secs: 0,
        });
        cache.put("(uid=jdoe)", result("jdoe"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("(uid=jdoe)").is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ResultCache::new(CacheConfig {
            capacity: 2,
            ttl_secs: 60,
        });
        cache.put("a", result("a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b", result("b"));
        cache.put("c", result("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_clear_resets_stats() {
        let cache = ResultCache::new(CacheConfig::default());
        cache.put("a", result("a"));
        cache.get("a");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);
    }
}
