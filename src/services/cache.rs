//! Read cache for sheet grids.
//!
//! Entries are keyed by source and table name and expire after a caller-chosen
//! TTL. Nothing is evicted implicitly; expired entries are simply not served
//! and get overwritten on the next fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_id: String,
    pub table: String,
}

impl CacheKey {
    pub fn new(source_id: &str, table: &str) -> Self {
        CacheKey {
            source_id: source_id.to_string(),
            table: table.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

#[derive(Debug)]
pub struct TableCache<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
}

pub type SharedTableCache<V> = Arc<Mutex<TableCache<V>>>;

impl<V: Clone> TableCache<V> {
    pub fn new() -> Self {
        TableCache {
            entries: HashMap::new(),
        }
    }

    pub fn shared() -> SharedTableCache<V> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Returns a copy of the value if present and younger than `ttl`.
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: CacheKey, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry of one table regardless of source.
    pub fn invalidate_table(&mut self, table: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.table != table);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Clone> Default for TableCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_fresh_entries_only() {
        let mut cache = TableCache::new();
        let key = CacheKey::new("gsheets:abc", "Materiais");
        cache.insert(key.clone(), vec![1, 2, 3]);

        assert_eq!(cache.get(&key, Duration::from_secs(60)), Some(vec![1, 2, 3]));
        assert_eq!(cache.get(&key, Duration::ZERO), None);
    }

    #[test]
    fn keys_are_scoped_by_source() {
        let mut cache = TableCache::new();
        cache.insert(CacheKey::new("a", "Materiais"), 1);
        cache.insert(CacheKey::new("b", "Materiais"), 2);
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.get(&CacheKey::new("a", "Materiais"), ttl), Some(1));
        assert_eq!(cache.get(&CacheKey::new("b", "Materiais"), ttl), Some(2));
        assert_eq!(cache.get(&CacheKey::new("a", "Ficha Técnica"), ttl), None);
    }

    #[test]
    fn explicit_invalidation() {
        let mut cache = TableCache::new();
        let key = CacheKey::new("a", "Materiais");
        cache.insert(key.clone(), "grid");
        cache.insert(CacheKey::new("b", "Materiais"), "grid");
        cache.insert(CacheKey::new("a", "Ficha Técnica"), "grid");

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert_eq!(cache.invalidate_table("Materiais"), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn entry_expiry_is_relative_to_fetch_time() {
        let entry = CacheEntry {
            value: (),
            fetched_at: Instant::now(),
        };
        assert!(!entry.is_expired(Duration::from_secs(3600)));
        assert!(entry.is_expired(Duration::ZERO));
    }
}
