//! Digital signature operations.
//!
//! Dispatches a [`SignatureAlgorithm`] to the backend that implements it.
//! RSA with SHA-2 runs on aws-lc-rs; RSA-SHA1 and DSA run on OpenSSL.

use thiserror::Error;

use crate::algorithm::{KeyType, SignatureAlgorithm};
use crate::certificate::Certificate;
use crate::keys::SigningKey;
use crate::legacy;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification could not be performed.
    #[error("signature verification failed: {0}")]
    Verification(String),

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Algorithm not supported for the given key.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

impl From<openssl::error::ErrorStack> for SignatureError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Signing(err.to_string())
    }
}

fn ensure_key_type(
    algorithm: SignatureAlgorithm,
    key_type: KeyType,
) -> Result<(), SignatureError> {
    if algorithm.key_type() == key_type {
        Ok(())
    } else {
        Err(SignatureError::UnsupportedAlgorithm(format!(
            "{} cannot be used with a {key_type:?} key",
            algorithm.xml_dsig_uri()
        )))
    }
}

/// Signs `data` with `key` using `algorithm`.
///
/// ## Errors
///
/// Returns an error if the algorithm does not match the key type or the
/// backend fails.
pub fn sign(
    key: &SigningKey,
    algorithm: SignatureAlgorithm,
    data: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    ensure_key_type(algorithm, key.key_type())?;

    match algorithm {
        SignatureAlgorithm::RsaSha256
        | SignatureAlgorithm::RsaSha384
        | SignatureAlgorithm::RsaSha512 => legacy::rsa_sign(key.pkcs8_der(), data, algorithm),
        SignatureAlgorithm::RsaSha1
        | SignatureAlgorithm::DsaSha1
        | SignatureAlgorithm::DsaSha256 => legacy::openssl_sign(key.pkey(), data, algorithm),
    }
}

/// Verifies `signature` over `data` against the public key in `certificate`.
///
/// Returns `Ok(false)` for a well-formed verification that does not match.
///
/// ## Errors
///
/// Returns an error if the algorithm does not match the certificate key type
/// or the public key cannot be loaded.
pub fn verify(
    certificate: &Certificate,
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    ensure_key_type(algorithm, certificate.key_type())?;

    match algorithm {
        SignatureAlgorithm::RsaSha256
        | SignatureAlgorithm::RsaSha384
        | SignatureAlgorithm::RsaSha512 => {
            let pkcs1 = legacy::rsa_public_key_pkcs1(certificate.spki_der())?;
            legacy::rsa_verify(&pkcs1, data, signature, algorithm)
        }
        SignatureAlgorithm::RsaSha1
        | SignatureAlgorithm::DsaSha1
        | SignatureAlgorithm::DsaSha256 => {
            legacy::openssl_verify(certificate.spki_der(), data, signature, algorithm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_support::{dsa_key, rsa_key, self_signed};

    #[test]
    fn rsa_sha1_roundtrip() {
        let (key, pkey) = rsa_key();
        let cert = self_signed(&pkey);
        let sig = sign(&key, SignatureAlgorithm::RsaSha1, b"payload").unwrap();
        assert!(verify(&cert, SignatureAlgorithm::RsaSha1, b"payload", &sig).unwrap());
        assert!(!verify(&cert, SignatureAlgorithm::RsaSha1, b"tampered", &sig).unwrap());
    }

    #[test]
    fn rsa_sha256_roundtrip() {
        let (key, pkey) = rsa_key();
        let cert = self_signed(&pkey);
        let sig = sign(&key, SignatureAlgorithm::RsaSha256, b"payload").unwrap();
        assert!(verify(&cert, SignatureAlgorithm::RsaSha256, b"payload", &sig).unwrap());
        assert!(!verify(&cert, SignatureAlgorithm::RsaSha512, b"payload", &sig).unwrap());
    }

    #[test]
    fn dsa_sha256_roundtrip() {
        let (key, pkey) = dsa_key();
        let cert = self_signed(&pkey);
        let sig = sign(&key, SignatureAlgorithm::DsaSha256, b"payload").unwrap();
        assert!(verify(&cert, SignatureAlgorithm::DsaSha256, b"payload", &sig).unwrap());
        assert!(!verify(&cert, SignatureAlgorithm::DsaSha256, b"other", &sig).unwrap());
    }

    #[test]
    fn mismatched_key_type_is_rejected() {
        let (key, _) = rsa_key();
        let err = sign(&key, SignatureAlgorithm::DsaSha256, b"payload").unwrap_err();
        assert!(matches!(err, SignatureError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn garbage_signature_does_not_verify() {
        let (_, pkey) = dsa_key();
        let cert = self_signed(&pkey);
        assert!(!verify(&cert, SignatureAlgorithm::DsaSha1, b"payload", b"junk").unwrap());
    }
}
