//! Cryptographic algorithm definitions.
//!
//! Algorithms are identified on the wire by their XML-DSig URIs; both the
//! enveloped XML signature and the redirect-binding `SigAlg` parameter use
//! the same identifiers.

use thiserror::Error;

/// Error type for algorithm operations.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// Unknown algorithm URI.
    #[error("unknown algorithm: {0}")]
    Unknown(String),
}

/// Public key type of a key pair or certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA key.
    Rsa,
    /// DSA key.
    Dsa,
    /// Elliptic curve key.
    Ec,
    /// Anything else.
    Other,
}

impl KeyType {
    /// Maps an `AlgorithmIdentifier` OID in dotted form to a key type.
    #[must_use]
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.1" => Self::Rsa,
            "1.2.840.10040.4.1" => Self::Dsa,
            "1.2.840.10045.2.1" => Self::Ec,
            _ => Self::Other,
        }
    }
}

/// Message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-1 (legacy peers only).
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest method URI.
    ///
    /// ## Errors
    ///
    /// Returns an error for URIs without a local mapping.
    pub fn from_uri(uri: &str) -> Result<Self, AlgorithmError> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Ok(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(Self::Sha512),
            other => Err(AlgorithmError::Unknown(other.to_string())),
        }
    }
}

/// Signature algorithms accepted from and offered to SAML peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1.
    RsaSha1,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RsaSha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RsaSha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaSha512,
    /// DSA with SHA-1.
    DsaSha1,
    /// DSA with SHA-256.
    DsaSha256,
}

impl SignatureAlgorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 6] = [
        Self::RsaSha1,
        Self::RsaSha256,
        Self::RsaSha384,
        Self::RsaSha512,
        Self::DsaSha1,
        Self::DsaSha256,
    ];

    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            Self::DsaSha1 => "http://www.w3.org/2000/09/xmldsig#dsa-sha1",
            Self::DsaSha256 => "http://www.w3.org/2009/xmldsig11#dsa-sha256",
        }
    }

    /// Parses an XML-DSig algorithm URI.
    ///
    /// ## Errors
    ///
    /// Returns an error for URIs without a local mapping.
    pub fn from_uri(uri: &str) -> Result<Self, AlgorithmError> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.xml_dsig_uri() == uri)
            .ok_or_else(|| AlgorithmError::Unknown(uri.to_string()))
    }

    /// Returns the digest used inside the signature.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 | Self::DsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 | Self::DsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns the key type this algorithm signs with.
    #[must_use]
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha1 | Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512 => KeyType::Rsa,
            Self::DsaSha1 | Self::DsaSha256 => KeyType::Dsa,
        }
    }

    /// Returns whether this algorithm relies on SHA-1.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::RsaSha1 | Self::DsaSha1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_parses_from_its_uri() {
        for alg in SignatureAlgorithm::ALL {
            assert_eq!(SignatureAlgorithm::from_uri(alg.xml_dsig_uri()).ok(), Some(alg));
        }
    }

    #[test]
    fn unknown_uri_is_rejected() {
        let err = SignatureAlgorithm::from_uri("urn:example:rot13").unwrap_err();
        assert!(err.to_string().contains("rot13"));
    }

    #[test]
    fn key_types_follow_algorithm_family() {
        assert_eq!(SignatureAlgorithm::DsaSha256.key_type(), KeyType::Dsa);
        assert_eq!(SignatureAlgorithm::RsaSha1.key_type(), KeyType::Rsa);
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::RsaSha256.is_deprecated());
    }

    #[test]
    fn key_type_from_oid() {
        assert_eq!(KeyType::from_oid("1.2.840.10040.4.1"), KeyType::Dsa);
        assert_eq!(KeyType::from_oid("1.2.840.113549.1.1.1"), KeyType::Rsa);
        assert_eq!(KeyType::from_oid("1.3.101.112"), KeyType::Other);
    }

    #[test]
    fn digest_uri_roundtrip() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(HashAlgorithm::from_uri(alg.xml_dsig_uri()).ok(), Some(alg));
        }
    }
}
