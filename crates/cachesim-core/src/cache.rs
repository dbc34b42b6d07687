//! Per-server resource cache.
//!
//! Models the local cache of one backend: the set of resource keys it has
//! already fetched. The cache only grows; there is no eviction, so once a
//! server has seen every key in the population it never misses again.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Set of cached resource keys behind a read/write lock.
#[derive(Debug, Default)]
pub struct ResourceCache {
    keys: RwLock<HashSet<Arc<str>>>,
    /// Cache hit counter.
    hits: AtomicU64,
    /// Cache miss counter.
    misses: AtomicU64,
}

/// Statistics snapshot for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared lock for the hit check.
    pub fn read(&self) -> RwLockReadGuard<'_, HashSet<Arc<str>>> {
        self.keys.read()
    }

    /// Exclusive lock held across a simulated fetch.
    pub fn write(&self) -> RwLockWriteGuard<'_, HashSet<Arc<str>>> {
        self.keys.write()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that hit, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_keys: self.len(),
            hits: self.hits(),
            misses: self.misses(),
            hit_rate: self.hit_rate(),
        }
    }
}
