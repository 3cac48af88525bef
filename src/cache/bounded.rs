//! Fixed-capacity LRU cache for tiles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::CacheStats;
use crate::tile::{CachedTile, TileKey};

/// Entry in the bounded cache.
#[derive(Debug)]
struct Entry {
    tile: Arc<CachedTile>,
    /// Recency tick; larger means more recently used.
    last_used: u64,
}

/// Thread-safe fixed-capacity tile cache with LRU eviction.
///
/// `get` promotes the entry to most-recently-used; `insert` evicts the
/// least-recently-used entry when the capacity would be exceeded. Values
/// are shared: holders keep their `Arc<CachedTile>` after the cache
/// evicts its own reference.
///
/// Recency is a monotonic tick rather than a timestamp, so entries
/// touched within the same instant still order deterministically.
#[derive(Debug)]
pub struct BoundedTileCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<TileKey, Entry>,
    tick: u64,
    stats: CacheStats,
}

impl BoundedTileCache {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                tick: 0,
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    /// Look up a tile, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &TileKey) -> Option<Arc<CachedTile>> {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                let tile = Arc::clone(&entry.tile);
                inner.stats.hits += 1;
                Some(tile)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a tile, evicting the LRU entry on overflow.
    pub fn insert(&self, key: TileKey, tile: Arc<CachedTile>) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(key, Entry {
            tile,
            last_used: tick,
        });
        inner.stats.insertions += 1;
        if inner.entries.len() > self.capacity {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&victim);
                inner.stats.evictions += 1;
            }
        }
    }

    /// Returns true if the key is currently cached (no promotion).
    pub fn contains(&self, key: &TileKey) -> bool {
        self.inner.lock().unwrap().entries.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Returns true when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity in entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> TileKey {
        TileKey::new(name)
    }

    fn tile(byte: u8) -> Arc<CachedTile> {
        Arc::new(CachedTile::new(vec![byte]))
    }

    #[test]
    fn test_insert_then_get() {
        let cache = BoundedTileCache::new(4);
        cache.insert(key("a"), tile(1));
        let got = cache.get(&key("a")).unwrap();
        assert_eq!(got.data().as_ref(), &[1]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = BoundedTileCache::new(4);
        assert!(cache.get(&key("missing")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_capacity_overflow_evicts_lru() {
        let cache = BoundedTileCache::new(2);
        cache.insert(key("a"), tile(1));
        cache.insert(key("b"), tile(2));
        cache.insert(key("c"), tile(3));

        assert!(!cache.contains(&key("a")), "oldest entry should be evicted");
        assert!(cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_promotes_to_mru() {
        let cache = BoundedTileCache::new(2);
        cache.insert(key("a"), tile(1));
        cache.insert(key("b"), tile(2));

        // Touch "a" so "b" becomes the LRU entry.
        cache.get(&key("a"));
        cache.insert(key("c"), tile(3));

        assert!(cache.contains(&key("a")), "promoted entry should survive");
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_replace_existing_does_not_evict() {
        let cache = BoundedTileCache::new(2);
        cache.insert(key("a"), tile(1));
        cache.insert(key("b"), tile(2));
        cache.insert(key("a"), tile(9));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&key("a")).unwrap().data().as_ref(), &[9]);
    }

    #[test]
    fn test_evicted_value_survives_for_holders() {
        let cache = BoundedTileCache::new(1);
        cache.insert(key("a"), tile(1));
        let held = cache.get(&key("a")).unwrap();
        cache.insert(key("b"), tile(2));

        assert!(!cache.contains(&key("a")));
        assert_eq!(held.data().as_ref(), &[1]);
    }

    #[test]
    fn test_clear() {
        let cache = BoundedTileCache::new(4);
        cache.insert(key("a"), tile(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().insertions, 1);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_rejected() {
        BoundedTileCache::new(0);
    }
}
