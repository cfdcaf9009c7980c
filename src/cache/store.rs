//! Keyed TTL cache.
//!
//! Entries expire passively: an expired entry reads as absent and is removed
//! on that read. Nothing sweeps in the background.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

const METRIC_HIT: &str = "tripkit_cache_hit_total";
const METRIC_MISS: &str = "tripkit_cache_miss_total";
const METRIC_EXPIRED: &str = "tripkit_cache_expired_total";
const METRIC_PRODUCER_ERROR: &str = "tripkit_cache_producer_error_total";
const METRIC_PRODUCER_MS: &str = "tripkit_cache_producer_ms";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    EmptyKey,
}

/// A stored value with the instant it was written and its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// Valid iff `now - stored_at < ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Options for [`KeyedCache::get_or_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Duration,
    /// Run the producer even when a valid entry exists.
    pub force: bool,
}

impl CacheOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self { ttl, force: false }
    }

    pub fn forced(self) -> Self {
        Self {
            force: true,
            ..self
        }
    }
}

/// String-keyed cache with independent per-entry expiry.
///
/// Backed by a sharded concurrent map so readers never wait on each other.
/// Concurrent misses on the same key are not coalesced: each caller runs its
/// own producer and the last write wins.
pub struct KeyedCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> KeyedCache<V> {
    /// Create an empty cache. `name` labels the emitted metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the value for `key`, or compute, store and return it.
    ///
    /// The producer runs at most once, and only when `options.force` is set or
    /// no valid entry exists. A failing producer leaves the entry untouched.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
        options: CacheOptions,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        if key.is_empty() {
            return Err(CacheError::EmptyKey.into());
        }

        if !options.force
            && let Some(value) = self.get(key)
        {
            counter!(METRIC_HIT, "cache" => self.name).increment(1);
            debug!(cache = self.name, cache_key = key, "Cache hit");
            return Ok(value);
        }

        counter!(
            METRIC_MISS,
            "cache" => self.name,
            "reason" => if options.force { "forced" } else { "absent" }
        )
        .increment(1);

        let started_at = Instant::now();
        let value = match producer().await {
            Ok(value) => value,
            Err(err) => {
                counter!(METRIC_PRODUCER_ERROR, "cache" => self.name).increment(1);
                warn!(
                    cache = self.name,
                    cache_key = key,
                    "Cache producer failed; entry left untouched"
                );
                return Err(err);
            }
        };
        histogram!(METRIC_PRODUCER_MS, "cache" => self.name)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        self.entries
            .insert(key.to_string(), CacheEntry::new(value.clone(), options.ttl));
        debug!(
            cache = self.name,
            cache_key = key,
            ttl_ms = options.ttl.as_millis() as u64,
            "Cache entry stored"
        );

        Ok(value)
    }

    /// Return the value for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // Another writer may have refreshed the key since the read above.
            if self
                .entries
                .remove_if(key, |_, entry| !entry.is_valid_at(now))
                .is_some()
            {
                counter!(METRIC_EXPIRED, "cache" => self.name).increment(1);
                debug!(cache = self.name, cache_key = key, "Expired entry purged");
            }
        }

        None
    }

    /// Store `value` directly, bypassing the producer path.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Snapshot of the stored keys, expired entries included.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drop every expired entry now.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid_at(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
