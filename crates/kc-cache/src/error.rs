//! Cache error types.

use std::fmt;

/// Cache operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key not found in cache, or its entry has expired.
    NotFound,
    /// Key rejected before insertion.
    InvalidKey(String),
    /// Invalid cache configuration.
    Configuration(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found in cache"),
            Self::InvalidKey(msg) => write!(f, "invalid cache key: {msg}"),
            Self::Configuration(msg) => write!(f, "cache configuration error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
