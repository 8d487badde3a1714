//! Private signing keys.
//!
//! Keys arrive as PEM from the credential store, optionally encrypted with
//! a password. OpenSSL decodes them; RSA keys are also exported to PKCS#8
//! DER for the aws-lc-rs signing path.

use std::fmt;

use openssl::pkey::{Id, PKey, Private};

use crate::algorithm::{KeyType, SignatureAlgorithm};
use crate::signature::{self, SignatureError};

/// Private key used to sign outbound messages.
pub struct SigningKey {
    pkey: PKey<Private>,
    pkcs8_der: Vec<u8>,
    key_type: KeyType,
}

impl SigningKey {
    /// Decodes a PEM private key (PKCS#1, PKCS#8 or encrypted PKCS#8).
    ///
    /// ## Errors
    ///
    /// Returns an error if the PEM cannot be decoded with the given password.
    pub fn from_pem(pem: &[u8], password: Option<&str>) -> Result<Self, SignatureError> {
        let pkey = match password {
            Some(password) if !password.is_empty() => {
                PKey::private_key_from_pem_passphrase(pem, password.as_bytes())
            }
            _ => PKey::private_key_from_pem(pem),
        }
        .map_err(|e| SignatureError::InvalidKey(format!("cannot decode private key: {e}")))?;

        Self::from_pkey(pkey)
    }

    /// Wraps an already-decoded OpenSSL key.
    ///
    /// ## Errors
    ///
    /// Returns an error if the key cannot be exported to PKCS#8.
    pub fn from_pkey(pkey: PKey<Private>) -> Result<Self, SignatureError> {
        let key_type = match pkey.id() {
            Id::RSA => KeyType::Rsa,
            Id::DSA => KeyType::Dsa,
            Id::EC => KeyType::Ec,
            _ => KeyType::Other,
        };
        let pkcs8_der = pkey
            .private_key_to_pkcs8()
            .map_err(|e| SignatureError::InvalidKey(format!("cannot export key: {e}")))?;

        Ok(Self {
            pkey,
            pkcs8_der,
            key_type,
        })
    }

    /// Returns the key type.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Signs `data` with `algorithm`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the algorithm does not fit the key or signing fails.
    pub fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
    ) -> Result<Vec<u8>, SignatureError> {
        signature::sign(self, algorithm, data)
    }

    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.pkey
    }

    pub(crate) fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use openssl::symm::Cipher;

    use super::test_support::{dsa_key, rsa_key};
    use super::*;

    #[test]
    fn detects_key_types() {
        assert_eq!(rsa_key().0.key_type(), KeyType::Rsa);
        assert_eq!(dsa_key().0.key_type(), KeyType::Dsa);
    }

    #[test]
    fn decodes_password_protected_pem() {
        let (_, pkey) = rsa_key();
        let pem = pkey
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"changeit")
            .unwrap();

        let key = SigningKey::from_pem(&pem, Some("changeit")).unwrap();
        assert_eq!(key.key_type(), KeyType::Rsa);

        let err = SigningKey::from_pem(&pem, Some("wrong")).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidKey(_)));
    }

    #[test]
    fn decodes_plain_pem() {
        let (_, pkey) = dsa_key();
        let pem = pkey.private_key_to_pem_pkcs8().unwrap();
        let key = SigningKey::from_pem(&pem, None).unwrap();
        assert_eq!(key.key_type(), KeyType::Dsa);
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let (key, _) = rsa_key();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("Rsa"));
        assert!(!rendered.contains("pkcs8"));
    }
}
