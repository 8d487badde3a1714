//! Shared fixtures for unit tests.

use std::sync::OnceLock;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::dsa::Dsa;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::{X509NameBuilder, X509};

use base64::Engine;
use kc_crypto::Certificate;

use crate::credentials::Credential;

pub(crate) struct TestCredential {
    pkey: PKey<Private>,
    certificate_der: Vec<u8>,
}

impl TestCredential {
    fn generate(pkey: PKey<Private>, cn: &str) -> Self {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        Self {
            certificate_der: builder.build().to_der().unwrap(),
            pkey,
        }
    }

    pub(crate) fn certificate_b64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.certificate_der)
    }

    pub(crate) fn certificate(&self) -> Certificate {
        Certificate::from_der(&self.certificate_der).unwrap()
    }

    pub(crate) fn private_key_pem(&self) -> String {
        String::from_utf8(self.pkey.private_key_to_pem_pkcs8().unwrap()).unwrap()
    }

    pub(crate) fn credential(&self, alias: &str) -> Credential {
        Credential::new(alias, self.private_key_pem(), self.certificate_der.clone())
    }

    pub(crate) fn encrypted_credential(&self, alias: &str, password: &str) -> Credential {
        let pem = self
            .pkey
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
            .unwrap();
        Credential::new(alias, String::from_utf8(pem).unwrap(), self.certificate_der.clone())
            .with_password(password)
    }
}

pub(crate) fn rsa_credential() -> &'static TestCredential {
    static CREDENTIAL: OnceLock<TestCredential> = OnceLock::new();
    CREDENTIAL.get_or_init(|| {
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        TestCredential::generate(pkey, "rsa signer")
    })
}

pub(crate) fn other_rsa_credential() -> &'static TestCredential {
    static CREDENTIAL: OnceLock<TestCredential> = OnceLock::new();
    CREDENTIAL.get_or_init(|| {
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        TestCredential::generate(pkey, "untrusted signer")
    })
}

pub(crate) fn dsa_credential() -> &'static TestCredential {
    static CREDENTIAL: OnceLock<TestCredential> = OnceLock::new();
    CREDENTIAL.get_or_init(|| {
        let pkey = PKey::from_dsa(Dsa::generate(2048).unwrap()).unwrap();
        TestCredential::generate(pkey, "dsa signer")
    })
}

/// SP metadata with a signing key, a POST ACS and SOAP + Redirect + POST
/// logout endpoints.
pub(crate) fn sp_metadata(entity_id: &str, certificate_b64: &str, valid_until: Option<&str>) -> String {
    let valid_until = valid_until
        .map(|v| format!(r#" validUntil="{v}""#))
        .unwrap_or_default();
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{entity_id}"{valid_until}>
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate_b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:SOAP" Location="{entity_id}/slo/soap"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{entity_id}/slo/redirect"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="{entity_id}/slo/post"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="{entity_id}/acs" index="0"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#
    )
}
