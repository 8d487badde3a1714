//! X.509 certificate handling.
//!
//! Certificates come from metadata `KeyDescriptor` elements (bare base64),
//! from PEM files, or from the credential store as DER.

use base64::Engine;
use x509_parser::prelude::*;

use crate::algorithm::{KeyType, SignatureAlgorithm};
use crate::signature::{self, SignatureError};

/// Parsed X.509 certificate with the fields verification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    spki_der: Vec<u8>,
    key_type: KeyType,
    subject: String,
    not_before: i64,
    not_after: i64,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// ## Errors
    ///
    /// Returns an error if the DER is not a valid X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| SignatureError::InvalidCertificate(format!("cannot parse: {e}")))?;

        let spki = cert.public_key();
        let key_type = KeyType::from_oid(&spki.algorithm.algorithm.to_id_string());
        let validity = cert.validity();

        Ok(Self {
            der: der.to_vec(),
            spki_der: spki.raw.to_vec(),
            key_type,
            subject: cert.subject().to_string(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }

    /// Parses a PEM or bare base64 certificate.
    ///
    /// ## Errors
    ///
    /// Returns an error if decoding or parsing fails.
    pub fn from_text(text: &str) -> Result<Self, SignatureError> {
        let der = decode_certificate(text)
            .ok_or_else(|| SignatureError::InvalidCertificate("invalid encoding".to_string()))?;
        Self::from_der(&der)
    }

    /// DER bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Public key type.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Base64 of the DER, as carried in `ds:X509Certificate`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns whether `unix_seconds` falls in the validity window.
    #[must_use]
    pub const fn is_valid_at(&self, unix_seconds: i64) -> bool {
        self.not_before <= unix_seconds && unix_seconds <= self.not_after
    }

    /// Verifies a signature made by the holder of this certificate's key.
    ///
    /// ## Errors
    ///
    /// Returns an error if the algorithm does not fit the key.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        sig: &[u8],
    ) -> Result<bool, SignatureError> {
        signature::verify(self, algorithm, data, sig)
    }
}

/// Extracts DER data from a PEM string.
#[must_use]
pub fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = pem.find(&end)?;
    if end_pos < start {
        return None;
    }

    decode_base64_lenient(&pem[start..end_pos])
}

/// Decodes a certificate given as PEM or bare base64 (whitespace allowed).
#[must_use]
pub fn decode_certificate(text: &str) -> Option<Vec<u8>> {
    if text.contains("-----BEGIN") {
        pem_to_der(text, "CERTIFICATE")
    } else {
        decode_base64_lenient(text)
    }
}

fn decode_base64_lenient(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_support::{dsa_key, rsa_key, self_signed};

    #[test]
    fn detects_public_key_type() {
        let (_, rsa) = rsa_key();
        let (_, dsa) = dsa_key();
        assert_eq!(self_signed(&rsa).key_type(), KeyType::Rsa);
        assert_eq!(self_signed(&dsa).key_type(), KeyType::Dsa);
    }

    #[test]
    fn parses_base64_with_line_breaks() {
        let (_, pkey) = rsa_key();
        let cert = self_signed(&pkey);
        let b64 = cert.to_base64();
        let wrapped: String = b64
            .as_bytes()
            .chunks(64)
            .map(|chunk| format!("\n    {}", String::from_utf8_lossy(chunk)))
            .collect();

        let parsed = Certificate::from_text(&wrapped).unwrap();
        assert_eq!(parsed, cert);
        assert!(parsed.subject().contains("kc-crypto test"));
    }

    #[test]
    fn parses_pem() {
        let (_, pkey) = rsa_key();
        let cert = self_signed(&pkey);
        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            cert.to_base64()
        );
        assert_eq!(Certificate::from_text(&pem).unwrap().der(), cert.der());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Certificate::from_text("not base64 !!").is_err());
        assert!(Certificate::from_der(b"\x30\x03junk").is_err());
        assert!(decode_certificate("   ").is_none());
    }

    #[test]
    fn validity_window() {
        let (_, pkey) = rsa_key();
        let cert = self_signed(&pkey);
        assert!(!cert.is_valid_at(0));
    }
}
