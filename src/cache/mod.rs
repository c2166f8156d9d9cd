//! Query result cache — short-lived memoization of hot read paths.
//!
//! [`QueryCache`] stores the result of an expensive read under a key derived
//! from the query's shape (see [`QueryKey`]). Entries live for a fixed TTL
//! (30 seconds by default) and expire lazily: an expired entry is treated as
//! absent on read but stays in the map until it is overwritten, invalidated,
//! or removed by an explicit [`QueryCache::purge_expired`] call.
//!
//! Write paths own freshness. After mutating an entity, call
//! [`QueryCache::invalidate`] with its identifier so that every cached variant
//! of it (full, summary-only, paginated) is dropped together.
//!
//! ## Concurrency
//!
//! The cache is meant to be shared behind an [`Arc`] across Tokio tasks.
//! Two concurrent misses for the same key both load and both write; the
//! second write replaces the first with an equally valid value. There is no
//! single-flight de-duplication.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

pub mod key;

pub use key::{QueryKey, derive_key, namespace};

/// Default time-to-live for cached query results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry<V> {
    value: Arc<V>,
    stored_at: Instant,
}

/// Lock-free hit/miss counters for a [`QueryCache`].
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidated: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub invalidated: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups served from the cache (0.0 when nothing was looked up).
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

/// A TTL cache of query results, keyed by [`QueryKey`] shape.
///
/// Values are stored as `Arc<V>` so hits never clone the payload. A "not
/// found" result is cached like any other value; use `V = Option<T>` to
/// memoize tombstones.
///
/// # Examples
///
/// ```
/// use vitrine::cache::{QueryCache, QueryKey};
///
/// struct ById(String);
///
/// impl QueryKey for ById {
///     fn entity_id(&self) -> &str { &self.0 }
///     fn shape(&self) -> String { "full".into() }
/// }
///
/// let cache: QueryCache<ById, u32> = QueryCache::new();
/// let q = ById("apto-7".into());
///
/// assert!(cache.get(&q).is_none());
/// cache.set(&q, 7);
/// assert_eq!(cache.get(&q).as_deref(), Some(&7));
///
/// cache.invalidate(Some("apto-7"));
/// assert!(cache.get(&q).is_none());
/// ```
pub struct QueryCache<K, V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
    stats: CacheStats,
    _key: PhantomData<fn(&K)>,
}

impl<K: QueryKey, V> Default for QueryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: QueryKey, V> QueryCache<K, V> {
    /// Creates an empty cache with the [`DEFAULT_TTL`].
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache whose entries stay valid for `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
            _key: PhantomData,
        }
    }

    /// Returns the configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `query` if it was stored less than one
    /// TTL ago. A miss is a normal outcome, not an error.
    pub fn get(&self, query: &K) -> Option<Arc<V>> {
        self.lookup(&derive_key(query), Instant::now())
    }

    /// Stores `value` for `query`, replacing whatever was cached before.
    pub fn set(&self, query: &K, value: V) {
        self.store(derive_key(query), Arc::new(value));
    }

    /// Returns the cached value, or awaits `load` and caches its result.
    ///
    /// Errors from `load` are returned as-is and are not cached.
    ///
    /// # Errors
    ///
    /// Propagates the error produced by `load` on a miss.
    pub async fn get_or_load<F, Fut, E>(&self, query: &K, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = derive_key(query);
        if let Some(hit) = self.lookup(&key, Instant::now()) {
            return Ok(hit);
        }

        let value = Arc::new(load().await?);
        self.store(key, Arc::clone(&value));
        Ok(value)
    }

    /// Drops cached results.
    ///
    /// With `None` the whole cache is cleared. With `Some(id)` every variant
    /// cached for that entity is removed, whatever options it was read with.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, entity_id: Option<&str>) -> usize {
        match entity_id {
            Some(id) => self.invalidate_prefix(&namespace(id)),
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                self.stats
                    .invalidated
                    .fetch_add(removed as u64, Ordering::Relaxed);
                debug!(removed, "query cache cleared");
                removed
            }
        }
    }

    /// Removes every entry whose raw key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        self.stats
            .invalidated
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!(prefix, removed, "query cache invalidated");
        removed
    }

    /// Physically removes entries that are already logically expired.
    ///
    /// Reads never need this; it only reclaims memory. Nothing calls it
    /// automatically.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<Arc<V>> {
        let hit = self.entries.get(key).and_then(|entry| {
            (now.saturating_duration_since(entry.stored_at) < self.ttl)
                .then(|| Arc::clone(&entry.value))
        });

        let counter = if hit.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    fn store(&self, key: String, value: Arc<V>) {
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}
