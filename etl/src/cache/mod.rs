//! Bounded time-to-live cache with get-or-compute semantics.
//!
//! Used by the statistics service so repeated queries within the TTL reuse
//! one computation. When full, expired entries are evicted first, then the
//! least recently computed one.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

/// A cached value with bookkeeping
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// When the value was computed
    stored_at: Instant,
    /// Number of times served from cache
    hits: u32,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Time-bounded, capacity-bounded cache.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    config: CacheConfig,
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// A failed computation is not cached.
    pub fn get_or_compute<F, E>(&mut self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_at(key, Instant::now(), compute)
    }

    /// [`Self::get_or_compute`] with an explicit clock reading.
    pub(crate) fn get_or_compute_at<F, E>(&mut self, key: K, now: Instant, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let ttl = self.config.ttl;
        if let Some(entry) = self.entries.get_mut(&key) {
            if !is_expired(entry.stored_at, now, ttl) {
                entry.hits += 1;
                self.stats.hits += 1;
                return Ok(entry.value.clone());
            }
        }

        self.stats.misses += 1;
        let value = compute()?;
        self.entries.remove(&key);
        self.make_room(now);
        self.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                stored_at: now,
                hits: 0,
            },
        );
        Ok(value)
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drop one entry.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn make_room(&mut self, now: Instant) {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| !is_expired(e.stored_at, now, ttl));
        self.stats.evictions += (before - self.entries.len()) as u64;

        let capacity = self.config.capacity.max(1);
        while self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.stored_at, e.hits))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

fn is_expired(stored_at: Instant, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(stored_at) >= ttl
}
