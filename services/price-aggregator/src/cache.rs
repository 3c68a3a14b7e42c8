//! TTL cache with lazy population and external invalidation
//!
//! Entries are loaded on first access per key, expire a fixed duration after
//! insertion, and can be dropped early by `invalidate` / `invalidate_all`.
//! There is no size-based eviction.
//!
//! Time is read through `tokio::time::Instant` so paused-clock tests can
//! advance past the TTL deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Concurrency-safe map of string keys to values with a fixed time-to-live.
///
/// Every invalidation bumps a generation counter. A load that started
/// under an older generation still answers its caller but is not written
/// back, so a lookup starting after an invalidation never sees a value
/// loaded before it.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or the result of `load` stored for next time.
    ///
    /// A failed load is returned as-is and nothing is cached.
    pub fn get_or_load<E, F>(&self, key: &str, load: F) -> Result<V, E>
    where
        F: FnOnce(&str) -> Result<V, E>,
    {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::SeqCst);
        let value = load(key)?;

        let entry = self.entries.entry(key.to_string());
        if self.generation.load(Ordering::SeqCst) == generation {
            entry.insert(CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
            });
        } else {
            debug!(key, "Invalidated during load, not caching");
        }

        Ok(value)
    }

    /// Drop one key. Idempotent.
    pub fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key);
        debug!(key, "Cache entry invalidated");
    }

    /// Drop every key. Idempotent.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        debug!("Cache cleared");
    }

    /// Entries currently held, expired ones included until overwritten.
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
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;

    fn counting_load(calls: &Cell<u32>, value: i32) -> impl FnOnce(&str) -> Result<i32, ()> + '_ {
        move |_| {
            calls.set(calls.get() + 1);
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(5));
        let calls = Cell::new(0);

        assert_eq!(cache.get_or_load("a", counting_load(&calls, 1)), Ok(1));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get_or_load("a", counting_load(&calls, 2)), Ok(1));

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_after_ttl_expiry() {
        let cache = TtlCache::new(Duration::from_secs(5));
        let calls = Cell::new(0);

        cache.get_or_load("a", counting_load(&calls, 1)).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get_or_load("a", counting_load(&calls, 2)), Ok(2));
        assert_eq!(calls.get(), 2);

        assert_eq!(cache.get_or_load("a", counting_load(&calls, 3)), Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_reload() {
        let cache = TtlCache::new(Duration::from_secs(3600));
        let calls = Cell::new(0);

        cache.get_or_load("a", counting_load(&calls, 1)).unwrap();
        cache.get_or_load("b", counting_load(&calls, 10)).unwrap();
        cache.invalidate("a");
        cache.invalidate("a");

        assert_eq!(cache.get_or_load("a", counting_load(&calls, 2)), Ok(2));
        assert_eq!(cache.get_or_load("b", counting_load(&calls, 20)), Ok(10));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_all_forces_reload() {
        let cache = TtlCache::new(Duration::from_secs(3600));
        let calls = Cell::new(0);

        cache.get_or_load("a", counting_load(&calls, 1)).unwrap();
        cache.get_or_load("b", counting_load(&calls, 2)).unwrap();
        cache.invalidate_all();
        assert!(cache.is_empty());

        cache.get_or_load("a", counting_load(&calls, 3)).unwrap();
        cache.get_or_load("b", counting_load(&calls, 4)).unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_failed_load_not_cached() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_load("a", |_| Err("down")), Err("down"));
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_load("a", |_| Ok::<_, &str>(5)), Ok(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_load_overlapping_invalidation_is_not_cached() {
        let cache = TtlCache::new(Duration::from_secs(60));

        let stale = cache.get_or_load("a", |key| {
            cache.invalidate(key);
            Ok::<_, ()>(1)
        });
        assert_eq!(stale, Ok(1));
        assert!(cache.is_empty());

        assert_eq!(cache.get_or_load("a", |_| Ok::<_, ()>(2)), Ok(2));
    }

    #[test]
    fn test_concurrent_lookups_and_invalidations() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let key = format!("k{}", i % 16);
                        let value = cache.get_or_load(&key, |k| Ok::<_, ()>(k.len())).unwrap();
                        assert_eq!(value, key.len());
                        if worker == 0 && i % 100 == 0 {
                            cache.invalidate_all();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }
}
