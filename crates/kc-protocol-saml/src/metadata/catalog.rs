//! In-memory entity catalog.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kc_crypto::Certificate;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// The `use` attribute of a metadata `KeyDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDescriptorUse {
    /// `use="signing"`.
    Signing,
    /// `use="encryption"`.
    Encryption,
    /// No `use` attribute.
    Unspecified,
}

impl KeyDescriptorUse {
    /// Parses the `use` attribute value.
    #[must_use]
    pub fn from_attr(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("signing") => Self::Signing,
            Some("encryption") => Self::Encryption,
            _ => Self::Unspecified,
        }
    }
}

/// A service endpoint declared in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint URL.
    pub location: String,
    /// Binding the endpoint accepts.
    pub binding: SamlBinding,
}

/// Everything this core knows about one IdP or SP.
///
/// Records are replaced wholesale on re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Entity identifier URI.
    pub entity_id: String,
    /// DER of the certificate used to verify this entity's signatures.
    pub signing_certificate: Option<Vec<u8>>,
    /// DER of the certificate used to encrypt for this entity.
    pub encryption_certificate: Option<Vec<u8>>,
    /// Selected assertion consumer service.
    pub assertion_consumer_service: Option<Endpoint>,
    /// Selected single logout service.
    pub single_logout_service: Option<Endpoint>,
    /// Instant after which the metadata should be re-read.
    pub valid_until: DateTime<Utc>,
}

impl EntityRecord {
    /// Creates a record with no certificates or endpoints.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            signing_certificate: None,
            encryption_certificate: None,
            assertion_consumer_service: None,
            single_logout_service: None,
            valid_until,
        }
    }

    /// Returns true once `now` has reached `valid_until`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }

    /// Parses the signing certificate.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::MissingCertificate`] if none was published and
    /// [`SamlError::Crypto`] if it cannot be parsed.
    pub fn signing_certificate(&self) -> SamlResult<Certificate> {
        let der = self.signing_certificate.as_deref().ok_or_else(|| {
            SamlError::MissingCertificate(format!(
                "no signing certificate published for {}",
                self.entity_id
            ))
        })?;
        Ok(Certificate::from_der(der)?)
    }
}

/// Upsert hook handed to metadata producers.
pub type UpsertCallback = Arc<dyn Fn(EntityRecord) + Send + Sync>;

/// Concurrent map from entity ID to its latest record.
///
/// Lookups hand out `Arc`s, so readers never hold a shard lock while
/// using a record.
#[derive(Debug, Default)]
pub struct EntityCatalog {
    entries: DashMap<String, Arc<EntityRecord>>,
}

impl EntityCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under `entity_id`, replacing any previous record.
    ///
    /// Returns the replaced record.
    pub fn upsert(
        &self,
        entity_id: impl Into<String>,
        record: EntityRecord,
    ) -> Option<Arc<EntityRecord>> {
        let entity_id = entity_id.into();
        debug!(entity_id = %entity_id, "Upserting entity metadata");
        self.entries.insert(entity_id, Arc::new(record))
    }

    /// Returns the record for `entity_id`.
    #[must_use]
    pub fn lookup(&self, entity_id: &str) -> Option<Arc<EntityRecord>> {
        self.entries.get(entity_id).map(|e| Arc::clone(e.value()))
    }

    /// Known entity IDs, unordered.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a callback that upserts records keyed by their entity ID.
    #[must_use]
    pub fn upsert_callback(self: &Arc<Self>) -> UpsertCallback {
        let catalog = Arc::clone(self);
        Arc::new(move |record: EntityRecord| {
            let entity_id = record.entity_id.clone();
            catalog.upsert(entity_id, record);
        })
    }
}
