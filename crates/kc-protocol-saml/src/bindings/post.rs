//! HTTP-POST Binding implementation.
//!
//! Messages are base64-encoded into a hidden form field. Signatures, when
//! present, are enveloped inside the XML.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::types::MessageKind;

use super::{DecodedMessage, HtmlTemplate};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes a message for a form field.
    #[must_use]
    pub fn encode_value(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Renders the auto-submit form for a message.
    #[must_use]
    pub fn render_form(
        template: &HtmlTemplate,
        destination: &str,
        kind: MessageKind,
        xml: &str,
        relay_state: Option<&str>,
    ) -> String {
        template.render(
            Some(destination),
            Some(kind.param_name()),
            Some(&Self::encode_value(xml)),
            relay_state,
        )
    }

    /// Decodes a message from POST form fields.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::IllegalArgument`] if neither message field is
    /// present, and decode errors for bad base64 or non-UTF-8 content.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, kind) = match (saml_request, saml_response) {
            (Some(req), None) => (req, MessageKind::Request),
            (None, Some(resp)) => (resp, MessageKind::Response),
            (Some(_), Some(_)) => {
                return Err(SamlError::IllegalArgument(
                    "form carries both SAMLRequest and SAMLResponse".to_string(),
                ))
            }
            (None, None) => {
                return Err(SamlError::IllegalArgument(
                    "no SAMLRequest or SAMLResponse parameter".to_string(),
                ))
            }
        };

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::XmlParse(format!("message is not UTF-8: {e}")))?;

        Ok(DecodedMessage {
            xml,
            kind,
            relay_state: relay_state.map(String::from),
            signature: None,
            sig_alg: None,
            signed_query: None,
        })
    }

    /// Decodes an `application/x-www-form-urlencoded` request body.
    ///
    /// ## Errors
    ///
    /// See [`Self::decode`].
    pub fn decode_form(body: &str) -> SamlResult<DecodedMessage> {
        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            match key.as_ref() {
                "SAMLRequest" => saml_request = Some(value.into_owned()),
                "SAMLResponse" => saml_response = Some(value.into_owned()),
                "RelayState" => relay_state = Some(value.into_owned()),
                _ => {}
            }
        }
        Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )
    }
}
