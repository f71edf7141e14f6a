use std::hash::Hash;

use indexmap::IndexMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Least-recently-used cache with a fixed capacity.
///
/// Evicted values are simply dropped: a lookup that misses must always be
/// answered by recomputing the value.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    // oldest first
    entries: IndexMap<K, V>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        BoundedCache {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.shift_remove_entry(key) {
            Some((key, value)) => {
                self.stats.hits += 1;
                self.entries.insert(key, value.clone());
                Some(value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.shift_remove(&key);
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
            self.stats.evictions += 1;
        }
        self.entries.insert(key, value);
    }

    pub fn get_or_insert_with<E>(
        &mut self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
