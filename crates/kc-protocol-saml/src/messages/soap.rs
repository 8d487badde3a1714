//! SOAP 1.1 envelopes for the SOAP binding.

use crate::error::{SamlError, SamlResult};
use crate::types::SOAP11_NS;
use crate::xml;

/// Strips a leading XML declaration, if any.
fn strip_declaration(document: &str) -> &str {
    let trimmed = document.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

/// Wraps a protocol message in a SOAP 1.1 envelope.
#[must_use]
pub fn wrap_in_soap_envelope(message_xml: &str) -> String {
    format!(
        r#"<soap11:Envelope xmlns:soap11="{SOAP11_NS}"><soap11:Body>{}</soap11:Body></soap11:Envelope>"#,
        strip_declaration(message_xml)
    )
}

/// Returns the single element inside the body of a SOAP 1.1 envelope.
///
/// The element text is returned exactly as it appears in the envelope so
/// that an enveloped signature over it still verifies. Namespace
/// declarations inherited from the envelope are added only when the
/// element does not parse on its own.
///
/// ## Errors
///
/// Returns [`SamlError::XmlParse`] if the document is not an envelope with
/// exactly one body element, and [`SamlError::Transport`] if the body holds
/// a SOAP fault.
pub fn unwrap_soap_body(envelope: &str) -> SamlResult<String> {
    let root = xml::parse(envelope)?;
    if !root.is(SOAP11_NS, "Envelope") {
        return Err(SamlError::XmlParse(format!(
            "expected a SOAP 1.1 Envelope, found {}",
            root.qualified_name()
        )));
    }
    let body = root
        .children
        .iter()
        .find(|c| c.is(SOAP11_NS, "Body"))
        .ok_or_else(|| SamlError::XmlParse("SOAP envelope has no Body".to_string()))?;

    let [element] = body.children.as_slice() else {
        return Err(SamlError::XmlParse(format!(
            "SOAP Body must hold exactly one element, found {}",
            body.children.len()
        )));
    };
    if element.is(SOAP11_NS, "Fault") {
        let reason = element.child_text("faultstring").unwrap_or("no faultstring");
        return Err(SamlError::Transport(format!("SOAP fault: {reason}")));
    }

    let raw = &envelope[element.span.clone()];
    if xml::parse(raw).is_ok() {
        Ok(raw.to_string())
    } else {
        Ok(element.standalone_source(envelope))
    }
}
