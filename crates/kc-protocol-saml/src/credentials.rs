//! Credential store collaborator.
//!
//! Signing and encryption keys are never read from disk by this crate.
//! They are resolved by alias through a [`CredentialStore`].
//!
//! ## NIST 800-53 Rev5: SC-12 (Cryptographic Key Management)

use std::fmt;

use dashmap::DashMap;
use kc_crypto::{Certificate, SigningKey};

use crate::error::{SamlError, SamlResult};

/// A private key with its certificate, resolved by alias.
#[derive(Clone)]
pub struct Credential {
    /// Alias the credential was stored under.
    pub alias: String,
    /// PEM-encoded private key, possibly encrypted.
    pub private_key_pem: String,
    /// Password protecting the private key.
    pub password: Option<String>,
    /// DER-encoded X.509 certificate for the key.
    pub certificate_der: Vec<u8>,
}

impl Credential {
    /// Creates a credential.
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        private_key_pem: impl Into<String>,
        certificate_der: Vec<u8>,
    ) -> Self {
        Self {
            alias: alias.into(),
            private_key_pem: private_key_pem.into(),
            password: None,
            certificate_der,
        }
    }

    /// Sets the key password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Decodes the private key.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Crypto`] if the PEM or password is wrong.
    pub fn signing_key(&self) -> SamlResult<SigningKey> {
        Ok(SigningKey::from_pem(
            self.private_key_pem.as_bytes(),
            self.password.as_deref(),
        )?)
    }

    /// Parses the certificate.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Crypto`] if the certificate is not valid DER.
    pub fn certificate(&self) -> SamlResult<Certificate> {
        Ok(Certificate::from_der(&self.certificate_der)?)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("alias", &self.alias)
            .field("has_password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolves credentials by alias.
pub trait CredentialStore: Send + Sync {
    /// Returns the credential stored under `alias`.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if no such credential exists.
    fn credential(&self, alias: &str) -> SamlResult<Credential>;
}

/// Credential store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: DashMap<String, Credential>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a credential under its alias.
    pub fn insert(&self, credential: Credential) {
        self.credentials.insert(credential.alias.clone(), credential);
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with_credential(self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn credential(&self, alias: &str) -> SamlResult<Credential> {
        self.credentials
            .get(alias)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SamlError::Configuration(format!("no credential with alias '{alias}'")))
    }
}
