//! Bounded, insertion-ordered TTL store.
//!
//! Entries expire relative to the moment they were stored; reads never
//! extend an entry's life. Expired entries are removed lazily when read.
//! When the store is full, the oldest inserted entry is evicted (FIFO).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

/// Configuration for a [`TtlCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied by [`TtlCache::set`].
    pub default_ttl: Duration,
    /// Maximum number of entries held at once.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            max_size: 100,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the maximum number of entries. Clamped to at least one.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }
}

/// A stored value together with the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time elapsed since the entry was stored.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    /// Expired once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }
}

/// Point-in-time statistics for a [`TtlCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory keyed store with per-entry TTL and a FIFO size bound.
///
/// All operations are synchronous and infallible. A poisoned lock is
/// recovered rather than propagated since every mutation leaves the map in
/// a consistent state.
#[derive(Debug)]
pub struct TtlCache<T> {
    config: CacheConfig,
    entries: Mutex<IndexMap<String, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    epoch: AtomicU64,
}

impl<T> TtlCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_size: config.max_size.max(1),
            ..config
        };
        Self {
            config,
            entries: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, IndexMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `data` under `key` with the store's default TTL.
    pub fn set(&self, key: impl Into<String>, data: T) {
        self.set_with_ttl(key, data, self.config.default_ttl);
    }

    /// Store `data` under `key` with an explicit TTL.
    ///
    /// Re-setting an existing key replaces the entry and moves it to the
    /// newest insertion position. Inserting a new key into a full store
    /// evicts the single oldest entry first.
    pub fn set_with_ttl(&self, key: impl Into<String>, data: T, ttl: Duration) {
        let mut entries = self.entries();
        self.insert(&mut entries, key.into(), CacheEntry::new(data, ttl));
    }

    /// Invalidation counter, bumped by [`TtlCache::invalidate`] and
    /// [`TtlCache::clear`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Store `data` with the default TTL unless an invalidation happened
    /// after `epoch` was read. Returns whether the value was stored.
    pub fn set_if_epoch(&self, key: impl Into<String>, data: T, epoch: u64) -> bool {
        let key = key.into();
        let mut entries = self.entries();
        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::trace!(key = %key, "invalidated while loading, not stored");
            return false;
        }
        let entry = CacheEntry::new(data, self.config.default_ttl);
        self.insert(&mut entries, key, entry);
        true
    }

    fn insert(
        &self,
        entries: &mut IndexMap<String, CacheEntry<T>>,
        key: String,
        entry: CacheEntry<T>,
    ) {
        if entries.shift_remove(&key).is_none() && entries.len() >= self.config.max_size {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %evicted, "cache entry evicted");
            }
        }

        entries.insert(key, entry);
    }

    /// Remove `key` if present.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if entries.shift_remove(key).is_some() {
            tracing::trace!(key, "cache entry invalidated");
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.entries();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        let expired_entries = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total_entries: entries.len(),
            valid_entries: entries.len() - expired_entries,
            expired_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone> TtlCache<T> {
    /// Fetch a live entry. An expired entry is deleted and reported absent.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries();

        let expired = match entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.shift_remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key, "cache entry expired");
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        entries.get(key).map(|entry| entry.data.clone())
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
