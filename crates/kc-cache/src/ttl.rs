//! Fixed-TTL in-memory cache.
//!
//! Entries expire a fixed duration after they were written; reads do not
//! extend their lifetime. Expired entries are dropped lazily on access and
//! by [`TtlCache::spawn_sweeper`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kc_core::SharedClock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    written_at: DateTime<Utc>,
}

/// Concurrent map whose entries expire a fixed time after insertion.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: chrono::Duration,
    clock: SharedClock,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    ///
    /// ## Errors
    ///
    /// Returns an error if `ttl` is zero or out of range.
    pub fn new(ttl: Duration, clock: SharedClock) -> CacheResult<Self> {
        if ttl.is_zero() {
            return Err(CacheError::Configuration("ttl must be positive".to_string()));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Configuration(format!("ttl out of range: {e}")))?;

        Ok(Self {
            entries: DashMap::new(),
            ttl,
            clock,
        })
    }

    fn is_expired(&self, entry: &Entry<V>, now: DateTime<Utc>) -> bool {
        now - entry.written_at >= self.ttl
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let written_at = self.clock.now();
        self.entries.insert(key.into(), Entry { value, written_at });
    }

    /// Returns a copy of the live value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(&entry, now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| self.is_expired(entry, now));
        None
    }

    /// Removes `key` and returns its value if it was still live.
    pub fn remove(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let (_, entry) = self.entries.remove(key)?;
        if self.is_expired(&entry, now) {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Starts a background task purging expired entries every `interval`.
    ///
    /// The task holds a weak reference and stops once the cache is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("TTL cache dropped, stopping sweeper");
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Swept expired cache entries");
                }
            }
        })
    }
}
