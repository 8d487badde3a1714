//! # kc-cache
//!
//! In-memory caches for the SAML security core.
//!
//! - [`TtlCache`] - fixed-TTL map measured from write time, lazily evicted
//!   on access and swept in the background
//! - [`RelayStateCache`] - opaque tokens carried through a redirect
//!   round-trip
//!
//! Nothing here survives a restart. A lost relay state means the caller
//! restarts the logout or login flow.
//!
//! ## Example
//!
//! ```ignore
//! use kc_cache::RelayStateCache;
//! use std::time::Duration;
//!
//! let cache = RelayStateCache::new(Duration::from_secs(600), clock)?;
//! let token = cache.put("https://sp.example.org/after-logout".to_string());
//! let target = cache.take(&token, true)?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod relay_state;
pub mod ttl;

pub use error::{CacheError, CacheResult};
pub use relay_state::{RelayStateCache, DEFAULT_RELAY_STATE_TTL};
pub use ttl::TtlCache;
