//! XML Signature creation.
//!
//! The signature is spliced into the original text rather than produced by
//! re-serializing a DOM, so the digested bytes are exactly the bytes sent.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use kc_crypto::{Certificate, SecurityEngine, SignatureAlgorithm, SigningKey};
use kc_core::SamlConfig;
use tracing::debug;

use super::validator::{verify_query_signature, verify_xml_signature, find_signature};
use super::SignatureContext;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{SamlError, SamlResult};
use crate::messages::MessageFactory;
use crate::types::{canonicalization_algorithms, ProtocolMessage, SAML_NS, XMLDSIG_NS};
use crate::xml::{self, XmlElement};

/// A detached redirect-binding signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySignature {
    /// Base64 signature value, not yet URL-encoded.
    pub signature: String,
    /// `SigAlg` URI.
    pub algorithm_uri: &'static str,
    /// The exact string that was signed.
    pub signed_string: String,
}

/// Signs outbound messages with the configured signing credential.
///
/// Holds only read-only key material; safe to share across threads.
pub struct SigningEngine {
    _engine: SecurityEngine,
    key: SigningKey,
    certificate: Certificate,
    rsa_algorithm: SignatureAlgorithm,
    store: Option<Arc<dyn CredentialStore>>,
}

impl fmt::Debug for SigningEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningEngine")
            .field("key_type", &self.key.key_type())
            .field("certificate", &self.certificate.subject())
            .field("rsa_algorithm", &self.rsa_algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningEngine {
    /// Creates an engine from decoded key material.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if `rsa_algorithm` is not an RSA
    /// algorithm or the certificate does not belong to the key type.
    pub fn new(
        engine: SecurityEngine,
        key: SigningKey,
        certificate: Certificate,
        rsa_algorithm: SignatureAlgorithm,
    ) -> SamlResult<Self> {
        if rsa_algorithm.key_type() != kc_crypto::KeyType::Rsa {
            return Err(SamlError::Configuration(format!(
                "{} is not an RSA signature algorithm",
                rsa_algorithm.xml_dsig_uri()
            )));
        }
        if key.key_type() != certificate.key_type() {
            return Err(SamlError::Configuration(format!(
                "signing key is {:?} but certificate is {:?}",
                key.key_type(),
                certificate.key_type()
            )));
        }

        Ok(Self {
            _engine: engine,
            key,
            certificate,
            rsa_algorithm,
            store: None,
        })
    }

    /// Creates an engine from the credential stored under `signing_alias`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the credential is missing or unusable.
    pub fn from_store(
        engine: SecurityEngine,
        store: Arc<dyn CredentialStore>,
        signing_alias: &str,
        rsa_algorithm: SignatureAlgorithm,
    ) -> SamlResult<Self> {
        let credential = store.credential(signing_alias)?;
        let mut signer = Self::new(
            engine,
            credential.signing_key()?,
            credential.certificate()?,
            rsa_algorithm,
        )?;
        signer.store = Some(store);
        debug!(alias = signing_alias, "Loaded signing credential");
        Ok(signer)
    }

    /// Creates an engine from the aliases and algorithm in `config`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the configured algorithm is unknown or the
    /// credential cannot be loaded.
    pub fn from_config(
        engine: SecurityEngine,
        store: Arc<dyn CredentialStore>,
        config: &SamlConfig,
    ) -> SamlResult<Self> {
        let rsa_algorithm = SignatureAlgorithm::from_uri(&config.rsa_signature_algorithm)?;
        Self::from_store(engine, store, &config.signing_key_alias, rsa_algorithm)
    }

    /// Resolves the encryption credential from the backing store.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] when the engine was built
    /// without a store or the alias is unknown.
    pub fn encryption_credential(&self, alias: &str) -> SamlResult<Credential> {
        self.store
            .as_ref()
            .ok_or_else(|| {
                SamlError::Configuration("signing engine has no credential store".to_string())
            })?
            .credential(alias)
    }

    /// The signing certificate.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Algorithms for the next signing operation.
    #[must_use]
    pub fn context(&self) -> SignatureContext {
        SignatureContext::for_key(self.key.key_type(), self.rsa_algorithm)
    }

    /// Serializes and signs a protocol message.
    ///
    /// ## Errors
    ///
    /// See [`Self::sign_xml`].
    pub fn sign_message(&self, message: &ProtocolMessage) -> SamlResult<String> {
        self.sign_xml(&MessageFactory::to_xml(message))
    }

    /// Adds an enveloped signature over the root element of `document`.
    ///
    /// The root must carry a non-blank `ID`. The signature is placed right
    /// after the `Issuer` element, or first in the root when there is none.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::IllegalArgument`] for a root without `ID` or an
    /// already signed document, and a crypto error if signing fails.
    pub fn sign_xml(&self, document: &str) -> SamlResult<String> {
        let ctx = self.context();
        let root = xml::parse(document)?;
        let expanded;
        let (document, root) = match expand_empty_root(document, &root) {
            Some(text) => {
                expanded = text;
                let root = xml::parse(&expanded)?;
                (expanded.as_str(), root)
            }
            None => (document, root),
        };

        let id = root
            .attr("ID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::IllegalArgument("root element has no ID".to_string()))?;
        if find_signature(&root).is_some() {
            return Err(SamlError::IllegalArgument(
                "document is already signed".to_string(),
            ));
        }

        let canonical = xml::canonicalize(document)?;
        let digest = kc_crypto::hash(ctx.digest, canonical.as_bytes());

        let insert_at = root
            .children
            .iter()
            .find(|c| c.is(SAML_NS, "Issuer"))
            .map_or(root.content_start, |issuer| issuer.span.end);
        let template = signature_template(&ctx, id, &encode(&digest), &self.certificate.to_base64());
        let draft = splice(document, insert_at, &template);

        // SignedInfo is canonicalized in place so verification sees the
        // same in-scope namespaces.
        let draft_root = xml::parse(&draft)?;
        let signature = find_signature(&draft_root)
            .ok_or_else(|| SamlError::Crypto("inserted signature not found".to_string()))?;
        let signed_info = required_child(signature, "SignedInfo")?;
        let canonical_signed_info = xml::canonicalize(&signed_info.standalone_source(&draft))?;
        let value = self
            .key
            .sign(ctx.algorithm, canonical_signed_info.as_bytes())?;

        let value_at = required_child(signature, "SignatureValue")?.content_start;
        debug!(id, algorithm = ctx.algorithm_uri(), "Signed XML document");
        Ok(splice(&draft, value_at, &encode(&value)))
    }

    /// Signs redirect-binding parameters.
    ///
    /// `params` is the already URL-encoded `SAMLRequest=..[&RelayState=..]`
    /// string; `&SigAlg=<encoded uri>` is appended before signing. The
    /// caller appends `SigAlg` and `Signature` to the URL in that order.
    ///
    /// ## Errors
    ///
    /// Returns a crypto error if signing fails.
    pub fn sign_query_string(&self, params: &str) -> SamlResult<QuerySignature> {
        let ctx = self.context();
        let algorithm_uri = ctx.algorithm_uri();
        let signed_string = format!("{params}&SigAlg={}", urlencoding::encode(algorithm_uri));
        let value = self.key.sign(ctx.algorithm, signed_string.as_bytes())?;

        Ok(QuerySignature {
            signature: encode(&value),
            algorithm_uri,
            signed_string,
        })
    }

    /// Verifies an enveloped signature against `trusted`.
    ///
    /// ## Errors
    ///
    /// See [`verify_xml_signature`].
    pub fn verify_xml_signature(&self, document: &str, trusted: &Certificate) -> SamlResult<()> {
        verify_xml_signature(document, trusted)
    }

    /// Verifies a detached query-string signature.
    ///
    /// ## Errors
    ///
    /// See [`verify_query_signature`].
    pub fn verify_query_signature(
        &self,
        sig_alg: &str,
        signed_string: &str,
        signature_b64: &str,
        certificate_b64: Option<&str>,
    ) -> SamlResult<bool> {
        verify_query_signature(sig_alg, signed_string, signature_b64, certificate_b64)
    }
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn splice(document: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(document.len() + insert.len());
    out.push_str(&document[..at]);
    out.push_str(insert);
    out.push_str(&document[at..]);
    out
}

/// Rewrites a self-closing root `<x .../>` as `<x ...></x>` so children can
/// be spliced in.
fn expand_empty_root(document: &str, root: &XmlElement) -> Option<String> {
    if root.span.end != root.content_start {
        return None;
    }
    let open = document[root.span.start..root.content_start].strip_suffix("/>")?;
    Some(format!(
        "{}{open}></{}>{}",
        &document[..root.span.start],
        root.qualified_name(),
        &document[root.content_start..]
    ))
}

fn required_child<'a>(element: &'a XmlElement, local: &str) -> SamlResult<&'a XmlElement> {
    element
        .children
        .iter()
        .find(|c| c.is(XMLDSIG_NS, local))
        .ok_or_else(|| SamlError::Crypto(format!("signature has no {local}")))
}

/// `<ds:Signature>` with an empty `SignatureValue` to be filled in.
fn signature_template(
    ctx: &SignatureContext,
    reference_id: &str,
    digest_b64: &str,
    certificate_b64: &str,
) -> String {
    format!(
        r##"<ds:Signature xmlns:ds="{ns}"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{c14n}"/><ds:SignatureMethod Algorithm="{sig}"/><ds:Reference URI="#{id}"><ds:Transforms><ds:Transform Algorithm="{enveloped}"/><ds:Transform Algorithm="{c14n}"/></ds:Transforms><ds:DigestMethod Algorithm="{digest}"/><ds:DigestValue>{digest_b64}</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue></ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature>"##,
        ns = XMLDSIG_NS,
        c14n = ctx.canonicalization,
        sig = ctx.algorithm_uri(),
        id = xml::escape_text(reference_id),
        enveloped = canonicalization_algorithms::ENVELOPED_SIGNATURE,
        digest = ctx.digest.xml_dsig_uri(),
        cert = certificate_b64,
    )
}
