//! # kc-crypto
//!
//! Cryptographic primitives for the SAML security core.
//!
//! - [`hash`] - message digests used for XML-DSig references
//! - [`keys`] - private keys resolved from the credential store
//! - [`certificate`] - X.509 parsing and public-key-type detection
//! - [`signature`] - raw asymmetric sign/verify dispatch
//! - [`engine`] - one-time backend initialisation
//!
//! ## Backends
//!
//! RSA PKCS#1 v1.5 with SHA-256/384/512 runs on aws-lc-rs. SAML peers still
//! use RSA-SHA1 and DSA, which aws-lc-rs does not sign; those go through
//! OpenSSL (see [`legacy`]).
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - SC-12: Cryptographic key management
//! - SC-13: Cryptographic protection

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod certificate;
pub mod engine;
pub mod hash;
pub mod keys;
pub mod legacy;
pub mod signature;

pub use algorithm::{AlgorithmError, HashAlgorithm, KeyType, SignatureAlgorithm};
pub use certificate::{decode_certificate, pem_to_der, Certificate};
pub use engine::SecurityEngine;
pub use hash::{hash, sha1, sha256, sha384, sha512};
pub use keys::SigningKey;
pub use signature::SignatureError;
