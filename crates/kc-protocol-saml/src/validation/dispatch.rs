//! Per (binding, direction) validation rules.

use crate::error::{ValidationFailure, ValidationRule};
use crate::types::{MessageKind, ProtocolMessage, SamlBinding};

/// A rule run during the required-fields stage.
pub type AdditionalCheck = fn(&ProtocolMessage) -> Result<(), ValidationFailure>;

fn require_name_id(message: &ProtocolMessage) -> Result<(), ValidationFailure> {
    match message {
        ProtocolMessage::LogoutRequest(request) if request.name_id.is_blank() => Err(
            ValidationFailure::new(ValidationRule::RequiredField, "NameID is missing"),
        ),
        _ => Ok(()),
    }
}

fn require_status_code(message: &ProtocolMessage) -> Result<(), ValidationFailure> {
    match message {
        ProtocolMessage::LogoutResponse(response) if response.status.status_code.is_blank() => {
            Err(ValidationFailure::new(
                ValidationRule::RequiredField,
                "StatusCode is missing",
            ))
        }
        _ => Ok(()),
    }
}

fn require_issuer(message: &ProtocolMessage) -> Result<(), ValidationFailure> {
    if message.issuer().trim().is_empty() {
        return Err(ValidationFailure::new(
            ValidationRule::RequiredField,
            "Issuer is missing",
        ));
    }
    Ok(())
}

const BROWSER_REQUEST: &[AdditionalCheck] = &[require_name_id];
const BACK_CHANNEL_REQUEST: &[AdditionalCheck] = &[require_name_id, require_issuer];
const RESPONSE: &[AdditionalCheck] = &[require_status_code];

/// Returns the built-in checks for a binding and direction.
///
/// Back-channel requests must name their issuer: no browser session exists
/// to attribute them to.
#[must_use]
pub fn additional_checks(binding: SamlBinding, kind: MessageKind) -> &'static [AdditionalCheck] {
    match (binding, kind) {
        (SamlBinding::HttpPost | SamlBinding::HttpRedirect, MessageKind::Request) => BROWSER_REQUEST,
        (SamlBinding::Soap | SamlBinding::Paos, MessageKind::Request) => BACK_CHANNEL_REQUEST,
        (_, MessageKind::Response) => RESPONSE,
    }
}
