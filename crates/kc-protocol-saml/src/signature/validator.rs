//! XML Signature validation.
//!
//! Enveloped signatures pass a profile check before any cryptography runs:
//! one `Signature` child of the root, one `Reference` pointing at the root
//! `ID`, an enveloped-signature transform, and only known algorithms.

use base64::Engine;
use kc_crypto::{Certificate, HashAlgorithm, SignatureAlgorithm};
use tracing::{debug, warn};

use crate::error::{SamlError, SamlResult, ValidationRule};
use crate::types::{canonicalization_algorithms, XMLDSIG_NS};
use crate::xml::{self, XmlElement};

/// Returns the enveloped `ds:Signature` child of `root`, if any.
#[must_use]
pub fn find_signature(root: &XmlElement) -> Option<&XmlElement> {
    root.children.iter().find(|c| c.is(XMLDSIG_NS, "Signature"))
}

/// Returns true if the document root carries an enveloped signature.
#[must_use]
pub fn has_embedded_signature(root: &XmlElement) -> bool {
    find_signature(root).is_some()
}

fn rejected(reason: impl Into<String>) -> SamlError {
    SamlError::validation(ValidationRule::Signature, reason)
}

fn dsig_child<'a>(element: &'a XmlElement, local: &str) -> SamlResult<&'a XmlElement> {
    let mut matches = element.children.iter().filter(|c| c.is(XMLDSIG_NS, local));
    let found = matches
        .next()
        .ok_or_else(|| rejected(format!("{} has no {local}", element.name)))?;
    if matches.next().is_some() {
        return Err(rejected(format!("{} has more than one {local}", element.name)));
    }
    Ok(found)
}

fn algorithm_attr<'a>(element: &'a XmlElement, local: &str) -> SamlResult<&'a str> {
    dsig_child(element, local)?
        .attr("Algorithm")
        .ok_or_else(|| rejected(format!("{local} has no Algorithm")))
}

fn decode_lenient(text: &str) -> SamlResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// The parts of a signature that passed the profile check.
struct CheckedSignature<'a> {
    signature: &'a XmlElement,
    signed_info: &'a XmlElement,
    algorithm: SignatureAlgorithm,
    digest_algorithm: HashAlgorithm,
    digest_value: Vec<u8>,
}

fn check_profile<'a>(root: &'a XmlElement) -> SamlResult<CheckedSignature<'a>> {
    let mut signatures = root.children.iter().filter(|c| c.is(XMLDSIG_NS, "Signature"));
    let signature = signatures
        .next()
        .ok_or_else(|| rejected("message is not signed"))?;
    if signatures.next().is_some() {
        return Err(rejected("message carries more than one signature"));
    }

    let signed_info = dsig_child(signature, "SignedInfo")?;
    let c14n = algorithm_attr(signed_info, "CanonicalizationMethod")?;
    if c14n != canonicalization_algorithms::EXCLUSIVE_C14N {
        return Err(SamlError::UnsupportedAlgorithm(c14n.to_string()));
    }
    let algorithm = SignatureAlgorithm::from_uri(algorithm_attr(signed_info, "SignatureMethod")?)?;

    let reference = dsig_child(signed_info, "Reference")?;
    let id = root
        .attr("ID")
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| rejected("signed element has no ID"))?;
    let uri = reference.attr("URI").unwrap_or_default();
    if uri.strip_prefix('#') != Some(id) {
        return Err(rejected(format!(
            "reference URI '{uri}' does not point at the message ID"
        )));
    }

    let transforms = dsig_child(reference, "Transforms")?;
    let mut enveloped = false;
    for transform in transforms.children.iter().filter(|c| c.is(XMLDSIG_NS, "Transform")) {
        match transform.attr("Algorithm") {
            Some(canonicalization_algorithms::ENVELOPED_SIGNATURE) => enveloped = true,
            Some(canonicalization_algorithms::EXCLUSIVE_C14N) => {}
            Some(other) => return Err(SamlError::UnsupportedAlgorithm(other.to_string())),
            None => return Err(rejected("Transform has no Algorithm")),
        }
    }
    if !enveloped {
        return Err(rejected("enveloped-signature transform missing"));
    }

    let digest_algorithm = HashAlgorithm::from_uri(algorithm_attr(reference, "DigestMethod")?)?;
    let digest_value = decode_lenient(dsig_child(reference, "DigestValue")?.text_trimmed())
        .map_err(|_| rejected("DigestValue is not base64"))?;

    Ok(CheckedSignature {
        signature,
        signed_info,
        algorithm,
        digest_algorithm,
        digest_value,
    })
}

/// Verifies the enveloped signature of `document` against `trusted`.
///
/// The profile check runs first, then the reference digest is recomputed
/// over the document with the signature removed, then the `SignedInfo`
/// signature is checked with the trusted certificate.
///
/// ## Errors
///
/// Returns a [`ValidationRule::Signature`] failure for a malformed profile,
/// a digest mismatch, or a signature that does not verify;
/// [`SamlError::UnsupportedAlgorithm`] for unknown algorithm URIs; and a
/// crypto error when the certificate cannot verify the algorithm at all.
pub fn verify_xml_signature(document: &str, trusted: &Certificate) -> SamlResult<()> {
    let root = xml::parse(document)?;
    let checked = check_profile(&root)?;
    if checked.algorithm.is_deprecated() {
        debug!(algorithm = checked.algorithm.xml_dsig_uri(), "Verifying SHA-1 based signature");
    }

    let span = checked.signature.span.clone();
    let mut unsigned = String::with_capacity(document.len());
    unsigned.push_str(&document[..span.start]);
    unsigned.push_str(&document[span.end..]);
    let digest = kc_crypto::hash(checked.digest_algorithm, xml::canonicalize(&unsigned)?.as_bytes());
    if digest != checked.digest_value {
        return Err(rejected("reference digest does not match message content"));
    }

    let signed_info = xml::canonicalize(&checked.signed_info.standalone_source(document))?;
    let value = decode_lenient(dsig_child(checked.signature, "SignatureValue")?.text_trimmed())
        .map_err(|_| rejected("SignatureValue is not base64"))?;

    if trusted.verify(checked.algorithm, signed_info.as_bytes(), &value)? {
        Ok(())
    } else {
        Err(rejected("signature does not verify against the trusted certificate"))
    }
}

/// Verifies a detached redirect-binding signature.
///
/// `certificate_b64` is the trusted certificate as base64 DER or PEM.
///
/// ## Errors
///
/// Returns [`SamlError::UnsupportedAlgorithm`] if `sig_alg` has no local
/// mapping, [`SamlError::MissingCertificate`] if no certificate was
/// supplied, and decode errors for a malformed certificate or signature.
pub fn verify_query_signature(
    sig_alg: &str,
    signed_string: &str,
    signature_b64: &str,
    certificate_b64: Option<&str>,
) -> SamlResult<bool> {
    let algorithm = SignatureAlgorithm::from_uri(sig_alg)?;

    let Some(certificate_b64) = certificate_b64.filter(|c| !c.trim().is_empty()) else {
        warn!(
            sig_alg,
            "No trusted certificate available for query signature check; check the trust configuration"
        );
        return Err(SamlError::MissingCertificate(
            "no certificate supplied for query signature verification".to_string(),
        ));
    };
    let certificate = Certificate::from_text(certificate_b64)?;
    let signature = decode_lenient(signature_b64)?;

    Ok(certificate.verify(algorithm, signed_string.as_bytes(), &signature)?)
}

#[cfg(test)]
mod tests {
    use kc_crypto::SecurityEngine;

    use super::*;
    use crate::signature::SigningEngine;
    use crate::test_support;

    const UNSIGNED: &str = r#"<samlp:LogoutResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp" Version="2.0" IssueInstant="2026-01-01T00:00:00Z"><saml:Issuer>https://sp.example.com</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:LogoutResponse>"#;

    fn signed() -> String {
        let credential = test_support::rsa_credential().credential("signing");
        SigningEngine::new(
            SecurityEngine::init().unwrap(),
            credential.signing_key().unwrap(),
            credential.certificate().unwrap(),
            SignatureAlgorithm::RsaSha256,
        )
        .unwrap()
        .sign_xml(UNSIGNED)
        .unwrap()
    }

    fn rule(result: SamlResult<()>) -> Option<ValidationRule> {
        result.unwrap_err().validation_rule()
    }

    #[test]
    fn verifies_with_trusted_certificate_only() {
        let document = signed();
        verify_xml_signature(&document, &test_support::rsa_credential().certificate()).unwrap();

        let untrusted = test_support::other_rsa_credential().certificate();
        assert_eq!(
            rule(verify_xml_signature(&document, &untrusted)),
            Some(ValidationRule::Signature)
        );
    }

    #[test]
    fn unsigned_document_is_rejected() {
        let cert = test_support::rsa_credential().certificate();
        assert_eq!(rule(verify_xml_signature(UNSIGNED, &cert)), Some(ValidationRule::Signature));
    }

    #[test]
    fn reference_must_point_at_root_id() {
        let cert = test_support::rsa_credential().certificate();
        let document = signed().replace("URI=\"#_resp\"", "URI=\"#_other\"");
        assert_eq!(rule(verify_xml_signature(&document, &cert)), Some(ValidationRule::Signature));
    }

    #[test]
    fn enveloped_transform_is_required() {
        let cert = test_support::rsa_credential().certificate();
        let document = signed().replace(
            &format!(r#"<ds:Transform Algorithm="{}"/>"#, canonicalization_algorithms::ENVELOPED_SIGNATURE),
            "",
        );
        assert_eq!(rule(verify_xml_signature(&document, &cert)), Some(ValidationRule::Signature));
    }

    #[test]
    fn unknown_signature_method_is_unsupported() {
        let cert = test_support::rsa_credential().certificate();
        let document = signed().replace(
            crate::types::signature_algorithms::RSA_SHA256,
            "urn:example:made-up",
        );
        let err = verify_xml_signature(&document, &cert).unwrap_err();
        assert!(matches!(err, SamlError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn altered_signature_value_fails() {
        let cert = test_support::rsa_credential().certificate();
        let document = signed();
        let root = xml::parse(&document).unwrap();
        let value = find_signature(&root).unwrap().child_text("SignatureValue").unwrap().to_string();
        let mut bytes = base64::engine::general_purpose::STANDARD.decode(&value).unwrap();
        bytes[0] ^= 0x01;
        let altered = document.replace(&value, &base64::engine::general_purpose::STANDARD.encode(bytes));
        assert_eq!(rule(verify_xml_signature(&altered, &cert)), Some(ValidationRule::Signature));
    }

    #[test]
    fn query_signature_errors() {
        let err = verify_query_signature("urn:unknown", "a=b", "AAAA", Some("AAAA")).unwrap_err();
        assert!(matches!(err, SamlError::UnsupportedAlgorithm(_)));

        let rsa = crate::types::signature_algorithms::RSA_SHA256;
        let err = verify_query_signature(rsa, "a=b", "AAAA", None).unwrap_err();
        assert!(matches!(err, SamlError::MissingCertificate(_)));

        let err = verify_query_signature(rsa, "a=b", "AAAA", Some("  ")).unwrap_err();
        assert!(matches!(err, SamlError::MissingCertificate(_)));
    }
}
