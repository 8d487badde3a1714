//! The validation state machine.

use std::fmt;

use kc_core::SharedClock;
use tracing::{debug, warn};
use url::Url;

use super::context::{SignaturePolicy, ValidationContext};
use super::dispatch::additional_checks;
use crate::error::{SamlError, SamlResult, ValidationFailure, ValidationRule};
use crate::messages::read_message;
use crate::signature::{has_embedded_signature, verify_query_signature, verify_xml_signature};
use crate::types::{MessageKind, ProtocolMessage, SamlBinding, SAML_VERSION};
use crate::xml::{self, XmlElement};

/// Progress of a message through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    /// Parsed, nothing checked yet.
    NotStarted,
    /// Issue instant within the accepted window.
    TimestampChecked,
    /// Version is "2.0".
    VersionChecked,
    /// Required fields present.
    RequiredFieldsChecked,
    /// Destination matches the receiving endpoint.
    DestinationChecked,
    /// Signature verified or tolerated by policy.
    SignatureChecked,
    /// InResponseTo matches the outstanding request.
    IdCorrelationChecked,
    /// Every check passed.
    Accepted,
}

impl ValidationStage {
    /// Returns the stage after this one. `Accepted` is terminal.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::NotStarted => Self::TimestampChecked,
            Self::TimestampChecked => Self::VersionChecked,
            Self::VersionChecked => Self::RequiredFieldsChecked,
            Self::RequiredFieldsChecked => Self::DestinationChecked,
            Self::DestinationChecked => Self::SignatureChecked,
            Self::SignatureChecked => Self::IdCorrelationChecked,
            Self::IdCorrelationChecked | Self::Accepted => Self::Accepted,
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A message that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    /// The parsed message.
    pub message: ProtocolMessage,
    /// Whether a signature was cryptographically verified. `false` only for
    /// unsigned embedded-signature messages accepted under
    /// [`SignaturePolicy::IfPresent`].
    pub signature_verified: bool,
}

/// Validates inbound messages against a fixed [`ValidationContext`].
///
/// Built with [`super::ValidatorBuilder`]. Holds no mutable state, so one
/// engine may validate many messages concurrently.
#[derive(Clone)]
pub struct ValidationEngine {
    context: ValidationContext,
    clock: SharedClock,
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

struct Inbound<'a> {
    document: &'a str,
    root: XmlElement,
    message: ProtocolMessage,
    signature_verified: bool,
}

impl ValidationEngine {
    pub(crate) fn new(context: ValidationContext, clock: SharedClock) -> Self {
        Self { context, clock }
    }

    /// Returns the context messages are checked against.
    #[must_use]
    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// Runs every check against a message document.
    ///
    /// For the SOAP binding `document` is the unwrapped body element; for
    /// the redirect binding it is the inflated message.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Validation`] naming the first rule the message
    /// broke. Signature checks may also fail with
    /// [`SamlError::UnsupportedAlgorithm`], [`SamlError::MissingCertificate`]
    /// or a crypto error; these are never downgraded to acceptance.
    pub fn validate(&self, document: &str) -> SamlResult<ValidatedMessage> {
        let mut inbound = self.parse(document).inspect_err(|err| {
            self.log_rejection(ValidationStage::NotStarted, err);
        })?;

        let mut stage = ValidationStage::NotStarted;
        while stage != ValidationStage::Accepted {
            if let Err(err) = self.advance(stage, &mut inbound) {
                self.log_rejection(stage, &err);
                return Err(err);
            }
            stage = stage.next();
        }

        debug!(
            id = inbound.message.id(),
            issuer = inbound.message.issuer(),
            binding = ?self.context.binding,
            signature_verified = inbound.signature_verified,
            "Accepted inbound message"
        );
        Ok(ValidatedMessage {
            message: inbound.message,
            signature_verified: inbound.signature_verified,
        })
    }

    fn parse<'a>(&self, document: &'a str) -> SamlResult<Inbound<'a>> {
        let malformed = |reason: String| SamlError::validation(ValidationRule::Malformed, reason);
        let root = xml::parse(document).map_err(|e| malformed(e.to_string()))?;
        let message = read_message(&root).map_err(|e| match e {
            SamlError::Validation(_) => e,
            other => malformed(other.to_string()),
        })?;
        if let Some(expected) = self.context.expected_kind {
            if message.kind() != expected {
                return Err(malformed(format!(
                    "expected a {}, received a {}",
                    expected.param_name(),
                    message.kind().param_name()
                )));
            }
        }
        Ok(Inbound {
            document,
            root,
            message,
            signature_verified: false,
        })
    }

    /// Runs the check that moves a message out of `stage`.
    fn advance(&self, stage: ValidationStage, inbound: &mut Inbound<'_>) -> SamlResult<()> {
        match stage {
            ValidationStage::NotStarted => Ok(self.check_timestamp(&inbound.message)?),
            ValidationStage::TimestampChecked => Ok(check_version(&inbound.message)?),
            ValidationStage::VersionChecked => Ok(self.check_required_fields(&inbound.message)?),
            ValidationStage::RequiredFieldsChecked => Ok(self.check_destination(&inbound.message)?),
            ValidationStage::DestinationChecked => {
                inbound.signature_verified = self.check_signature(inbound)?;
                Ok(())
            }
            ValidationStage::SignatureChecked => Ok(self.check_correlation(&inbound.message)?),
            ValidationStage::IdCorrelationChecked | ValidationStage::Accepted => Ok(()),
        }
    }

    fn check_timestamp(&self, message: &ProtocolMessage) -> Result<(), ValidationFailure> {
        let out_of_range =
            || ValidationFailure::new(ValidationRule::Timestamp, "issue instant out of range");
        let now = self.clock.now();
        let issued = message.issue_instant();
        let jitter = self.context.clock_jitter;

        let earliest_plausible = issued.checked_sub_signed(jitter).ok_or_else(out_of_range)?;
        if earliest_plausible > now {
            return Err(ValidationFailure::new(
                ValidationRule::Timestamp,
                format!("message issued in the future ({issued})"),
            ));
        }

        let latest_plausible = issued.checked_add_signed(jitter).ok_or_else(out_of_range)?;
        let oldest_accepted = now
            .checked_sub_signed(self.context.issue_timeout)
            .ok_or_else(out_of_range)?;
        if latest_plausible < oldest_accepted {
            return Err(ValidationFailure::new(
                ValidationRule::Timestamp,
                format!("message expired (issued {issued})"),
            ));
        }
        Ok(())
    }

    fn check_required_fields(&self, message: &ProtocolMessage) -> Result<(), ValidationFailure> {
        if message.id().trim().is_empty() {
            return Err(ValidationFailure::new(
                ValidationRule::RequiredField,
                "message ID is missing",
            ));
        }
        for check in additional_checks(self.context.binding, message.kind()) {
            check(message)?;
        }
        for check in &self.context.custom_validations {
            check(message)?;
        }
        Ok(())
    }

    fn check_destination(&self, message: &ProtocolMessage) -> Result<(), ValidationFailure> {
        let Some(declared) = message.destination().filter(|d| !d.trim().is_empty()) else {
            return Ok(());
        };
        let expected = self.context.destination.as_str();
        let matches = match (Url::parse(declared.trim()), Url::parse(expected.trim())) {
            (Ok(a), Ok(b)) => a == b,
            _ => declared.trim() == expected.trim(),
        };
        if matches {
            Ok(())
        } else {
            Err(ValidationFailure::new(
                ValidationRule::Destination,
                format!("destination {declared} does not match endpoint {expected}"),
            ))
        }
    }

    /// Returns whether a signature was verified.
    fn check_signature(&self, inbound: &Inbound<'_>) -> SamlResult<bool> {
        let certificate = self.context.trusted_certificate.as_ref();

        if self.context.binding == SamlBinding::HttpRedirect {
            let Some(detached) = &self.context.redirect_signature else {
                return Err(SamlError::validation(
                    ValidationRule::Signature,
                    "redirect message carries no signature",
                ));
            };
            let certificate_b64 = certificate.map(|c| c.to_base64());
            let valid = verify_query_signature(
                &detached.sig_alg,
                &detached.signed_query,
                &detached.signature,
                certificate_b64.as_deref(),
            )?;
            if !valid {
                return Err(SamlError::validation(
                    ValidationRule::Signature,
                    "query signature does not verify against the trusted certificate",
                ));
            }
            return Ok(true);
        }

        if !has_embedded_signature(&inbound.root) {
            if self.context.signature_policy == SignaturePolicy::Required {
                return Err(SamlError::validation(
                    ValidationRule::Signature,
                    "message is not signed",
                ));
            }
            debug!(
                id = inbound.message.id(),
                binding = ?self.context.binding,
                "Accepting unsigned message; signatures are optional for this endpoint"
            );
            return Ok(false);
        }

        let Some(certificate) = certificate else {
            warn!(
                issuer = inbound.message.issuer(),
                "No trusted certificate for signed message; check the trust configuration"
            );
            return Err(SamlError::MissingCertificate(format!(
                "no signing certificate known for {}",
                inbound.message.issuer()
            )));
        };
        verify_xml_signature(inbound.document, certificate)?;
        Ok(true)
    }

    fn check_correlation(&self, message: &ProtocolMessage) -> Result<(), ValidationFailure> {
        if message.kind() != MessageKind::Response {
            return Ok(());
        }
        let Some(expected) = self.context.expected_in_response_to.as_deref() else {
            return Ok(());
        };
        match message.in_response_to() {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(ValidationFailure::new(
                ValidationRule::Correlation,
                format!(
                    "InResponseTo {} does not match outstanding request {expected}",
                    actual.unwrap_or("(none)")
                ),
            )),
        }
    }

    fn log_rejection(&self, stage: ValidationStage, err: &SamlError) {
        match err {
            SamlError::Validation(failure) => warn!(
                rule = %failure.rule,
                reason = %failure.reason,
                %stage,
                binding = ?self.context.binding,
                "Rejected inbound message"
            ),
            other => warn!(
                error = %other,
                %stage,
                binding = ?self.context.binding,
                "Rejected inbound message"
            ),
        }
    }
}

fn check_version(message: &ProtocolMessage) -> Result<(), ValidationFailure> {
    if message.version() == SAML_VERSION {
        Ok(())
    } else {
        Err(ValidationFailure::new(
            ValidationRule::Version,
            format!("unsupported version {:?}", message.version()),
        ))
    }
}
