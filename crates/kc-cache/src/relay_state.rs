//! Relay state storage.
//!
//! Maps an opaque token to caller state for the duration of a redirect
//! round-trip. Tokens are single-use by default.

use std::sync::Arc;
use std::time::Duration;

use kc_core::SharedClock;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CacheError, CacheResult};
use crate::ttl::TtlCache;

/// Lifetime of a relay state entry, measured from write time.
pub const DEFAULT_RELAY_STATE_TTL: Duration = Duration::from_secs(600);

/// Short-lived token-to-state map shared by request handlers.
#[derive(Debug)]
pub struct RelayStateCache<V = String> {
    inner: Arc<TtlCache<V>>,
}

impl<V> Clone for RelayStateCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> RelayStateCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose entries live for `ttl`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `ttl` is zero.
    pub fn new(ttl: Duration, clock: SharedClock) -> CacheResult<Self> {
        Ok(Self {
            inner: Arc::new(TtlCache::new(ttl, clock)?),
        })
    }

    /// Creates a cache with the ten minute default lifetime.
    ///
    /// ## Errors
    ///
    /// Never fails for the default TTL; the signature matches [`Self::new`].
    pub fn with_default_ttl(clock: SharedClock) -> CacheResult<Self> {
        Self::new(DEFAULT_RELAY_STATE_TTL, clock)
    }

    /// Stores `value` under a fresh UUID token and returns the token.
    pub fn put(&self, value: V) -> String {
        let token = Uuid::new_v4().to_string();
        self.inner.insert(token.clone(), value);
        debug!(token = %token, "Stored relay state");
        token
    }

    /// Stores `value` under a caller-chosen key.
    ///
    /// ## Errors
    ///
    /// Returns an error if `key` is blank.
    pub fn put_with_key(&self, key: &str, value: V) -> CacheResult<()> {
        if key.trim().is_empty() {
            return Err(CacheError::InvalidKey("relay state key is blank".to_string()));
        }
        self.inner.insert(key, value);
        Ok(())
    }

    /// Returns the state stored under `token`.
    ///
    /// With `remove_after_read` the entry is consumed; otherwise it stays
    /// until its original expiry.
    ///
    /// ## Errors
    ///
    /// Returns [`CacheError::NotFound`] for unknown, consumed or expired
    /// tokens.
    pub fn take(&self, token: &str, remove_after_read: bool) -> CacheResult<V> {
        let value = if remove_after_read {
            self.inner.remove(token)
        } else {
            self.inner.get(token)
        };

        value.ok_or_else(|| {
            debug!(token = %token, "Relay state not found");
            CacheError::NotFound
        })
    }

    /// Starts the background sweep of expired entries.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.inner.spawn_sweeper(interval)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
