//! XML Signature support for SAML.
//!
//! Outbound messages are signed two ways depending on the binding:
//!
//! - an enveloped `<ds:Signature>` inside the XML (POST, SOAP, PAOS)
//! - a detached signature over the query string (HTTP-Redirect)
//!
//! Verification of both forms is exposed as free functions
//! ([`verify_xml_signature`], [`verify_query_signature`]) because inbound
//! checks need only a trusted certificate, never a private key.
//!
//! # Algorithms
//!
//! The signature algorithm follows the signing key: DSA keys sign with
//! DSA-SHA256, everything else with the configured RSA algorithm
//! (RSA-SHA1 unless overridden). Digests are always SHA-256 and
//! canonicalization is always exclusive C14N without comments.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use kc_crypto::{HashAlgorithm, KeyType, SignatureAlgorithm};

use crate::types::canonicalization_algorithms;

/// Algorithms used for one signing operation.
///
/// Built fresh for every call from the signing key type; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureContext {
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Canonicalization algorithm URI.
    pub canonicalization: &'static str,
    /// Digest algorithm for the enveloped reference.
    pub digest: HashAlgorithm,
}

impl SignatureContext {
    /// Selects algorithms for a key of `key_type`.
    #[must_use]
    pub const fn for_key(key_type: KeyType, rsa_algorithm: SignatureAlgorithm) -> Self {
        let algorithm = match key_type {
            KeyType::Dsa => SignatureAlgorithm::DsaSha256,
            _ => rsa_algorithm,
        };
        Self {
            algorithm,
            canonicalization: canonicalization_algorithms::EXCLUSIVE_C14N,
            digest: HashAlgorithm::Sha256,
        }
    }

    /// Signature algorithm URI.
    #[must_use]
    pub const fn algorithm_uri(&self) -> &'static str {
        self.algorithm.xml_dsig_uri()
    }
}
