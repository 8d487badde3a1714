//! Error handling for the SAML core.
//!
//! ## NIST 800-53 Rev5: SI-11 (Error Handling)
//!
//! Error messages name the offending setting but never echo secret values.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading configuration or templates.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a configuration error for an environment variable that failed to parse.
    #[must_use]
    pub fn invalid_var(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Config(format!("{name}: {reason}"))
    }
}
