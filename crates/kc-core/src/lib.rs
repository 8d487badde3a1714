//! # kc-core
//!
//! Core utilities, configuration, and error handling for the Keycloak Rust
//! SAML security core.
//!
//! This crate provides foundational types used across the SAML crates:
//!
//! - [`SamlConfig`] - timeouts, metadata sources, and key aliases
//! - [`Clock`] - the time source consulted by validation and caches
//! - [`Error`] - configuration loading errors
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - SC-12: Cryptographic key management (key aliases only, never raw keys)
//! - SI-11: Error handling

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{MetadataFetchConfig, SamlConfig};
pub use error::{Error, Result};
