//! Common test utilities and fixtures.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use kc_core::{ManualClock, SamlConfig, SharedClock};
use kc_crypto::SecurityEngine;
use kc_protocol_saml::{
    Credential, CredentialStore, EntityCatalog, InMemoryCredentialStore, LogoutService,
    SamlTransport, SigningEngine,
};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};

/// Alias the signing credential is stored under.
pub const SIGNING_ALIAS: &str = "signing";

/// Installs a test subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kc_protocol_saml=debug,kc_cache=debug")
        .with_test_writer()
        .try_init();
}

/// A fixed instant all parties agree on.
pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-15T09:30:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// A shared manual clock frozen at [`epoch`].
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

/// One side of a logout exchange with freshly generated keys.
pub struct Party {
    /// Entity ID.
    pub entity_id: String,
    /// Where this party receives logout messages.
    pub slo_url: String,
    credential: Credential,
}

impl Party {
    /// Generates an RSA key and self-signed certificate for `entity_id`.
    pub fn generate(entity_id: &str) -> anyhow::Result<Self> {
        let pkey = PKey::from_rsa(Rsa::generate(2048)?)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", entity_id.trim_start_matches("https://"))?;
        let name = name.build();

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let serial = BigNum::from_u32(1)?.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&pkey)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(30)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.sign(&pkey, MessageDigest::sha256())?;

        let pem = String::from_utf8(pkey.private_key_to_pem_pkcs8()?)?;
        Ok(Self {
            entity_id: entity_id.to_string(),
            slo_url: format!("{entity_id}/slo"),
            credential: Credential::new(SIGNING_ALIAS, pem, builder.build().to_der()?),
        })
    }

    /// Overrides the logout endpoint, e.g. to point at a mock server.
    pub fn with_slo_url(mut self, url: impl Into<String>) -> Self {
        self.slo_url = url.into();
        self
    }

    /// Base64 DER of the signing certificate.
    pub fn certificate_b64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.credential.certificate_der)
    }

    /// Metadata publishing the certificate and one logout endpoint.
    pub fn metadata(&self, slo_binding: &str) -> String {
        format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{entity_id}">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleLogoutService Binding="{slo_binding}" Location="{slo}"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
            entity_id = self.entity_id,
            cert = self.certificate_b64(),
            slo = self.slo_url,
        )
    }

    /// This party's configuration.
    pub fn config(&self) -> SamlConfig {
        SamlConfig {
            entity_id: self.entity_id.clone(),
            signing_key_alias: SIGNING_ALIAS.to_string(),
            ..SamlConfig::default()
        }
    }

    /// A signer backed by an in-memory credential store.
    pub fn signer(&self) -> anyhow::Result<Arc<SigningEngine>> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(InMemoryCredentialStore::new().with_credential(self.credential.clone()));
        Ok(Arc::new(SigningEngine::from_config(
            SecurityEngine::init()?,
            store,
            &self.config(),
        )?))
    }

    /// A logout service trusting whatever `catalog` holds.
    pub fn service(
        &self,
        catalog: Arc<EntityCatalog>,
        transport: Arc<dyn SamlTransport>,
        clock: SharedClock,
    ) -> anyhow::Result<LogoutService> {
        Ok(
            LogoutService::new(self.config(), catalog, self.signer()?, transport, clock)?
                .with_endpoint(&self.slo_url),
        )
    }
}
