//! Decoded-handle cache keyed by file name.
//!
//! Tile-major queries revisit every raster once per tile, so handles are kept
//! across calls in a bounded FIFO. Time-major queries finish a raster before
//! moving on; only the current handle is kept.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use rasq_core::error::{Error, Result};
use rasq_core::tile::Order;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Inner<V> {
    entries: VecDeque<(String, Arc<V>)>,
    hits: u64,
    misses: u64,
}

pub struct HandleCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V> HandleCache<V> {
    /// `capacity` bounds the tile-major FIFO; at least one handle is kept.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<V>>> {
        self.inner
            .lock()
            .map_err(|_| Error::Backend("handle cache lock poisoned".into()))
    }

    /// Cached handle for `key`, opening it with `open` on a miss.
    pub fn get_or_open<F>(&self, key: &str, order: Order, open: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        {
            let mut inner = self.lock()?;
            if let Some(v) = inner.entries.iter().find(|(k, _)| k == key).map(|(_, v)| Arc::clone(v)) {
                inner.hits += 1;
                trace!(key, "handle cache hit");
                return Ok(v);
            }
            inner.misses += 1;
        }

        // decode outside the lock
        let handle = Arc::new(open()?);
        trace!(key, %order, "handle cache miss");

        let mut inner = self.lock()?;
        let keep = match order {
            Order::TileMajor => self.capacity,
            Order::TimeMajor => 1,
        };
        while inner.entries.len() >= keep {
            inner.entries.pop_front();
        }
        inner.entries.push_back((key.to_string(), Arc::clone(&handle)));
        Ok(handle)
    }

    pub fn stats(&self) -> HandleCacheStats {
        match self.inner.lock() {
            Ok(inner) => HandleCacheStats {
                hits: inner.hits,
                misses: inner.misses,
                entries: inner.entries.len(),
            },
            Err(_) => HandleCacheStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_major_keeps_handles_up_to_capacity() {
        let cache = HandleCache::new(2);
        for key in ["a", "b", "a", "b"] {
            cache.get_or_open(key, Order::TileMajor, || Ok(key.len())).unwrap();
        }
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.entries), (2, 2, 2));

        cache.get_or_open("c", Order::TileMajor, || Ok(1)).unwrap();
        cache.get_or_open("a", Order::TileMajor, || Ok(1)).unwrap();
        assert_eq!(cache.stats().misses, 4, "a was evicted first");
    }

    #[test]
    fn time_major_keeps_only_the_current_handle() {
        let cache = HandleCache::new(8);
        cache.get_or_open("a", Order::TimeMajor, || Ok(0u8)).unwrap();
        cache.get_or_open("a", Order::TimeMajor, || Ok(0u8)).unwrap();
        cache.get_or_open("b", Order::TimeMajor, || Ok(0u8)).unwrap();
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.entries), (1, 2, 1));
    }

    #[test]
    fn failed_opens_are_not_cached() {
        let cache: HandleCache<u8> = HandleCache::new(4);
        assert!(cache
            .get_or_open("x", Order::TileMajor, || Err(Error::Backend("boom".into())))
            .is_err());
        assert_eq!(cache.stats().entries, 0);
    }
}
