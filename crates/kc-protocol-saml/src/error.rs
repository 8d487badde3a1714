//! SAML error types.
//!
//! Four families matter to callers:
//!
//! - configuration errors, raised while building components
//! - validation failures, raised per inbound message and always recoverable
//! - transport failures, raised by metadata retrieval and outbound sends
//! - crypto failures, fatal to the current operation
//!
//! A message that validated but could not be handed on is a
//! [`SamlError::Delivery`], never a signature failure.

use std::fmt;

use thiserror::Error;

use crate::types::status_codes;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// The validation rule a rejected message broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    /// Input was not well-formed XML or not the expected message.
    Malformed,
    /// Issue instant outside the accepted window.
    Timestamp,
    /// Version other than "2.0".
    Version,
    /// A required field is blank.
    RequiredField,
    /// Destination does not match the receiving endpoint.
    Destination,
    /// Signature missing, malformed, untrusted or invalid.
    Signature,
    /// InResponseTo does not match the outstanding request.
    Correlation,
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Malformed => "malformed",
            Self::Timestamp => "timestamp",
            Self::Version => "version",
            Self::RequiredField => "required-field",
            Self::Destination => "destination",
            Self::Signature => "signature",
            Self::Correlation => "correlation",
        };
        f.write_str(name)
    }
}

/// Rejection of an inbound message with the rule that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// The failing rule.
    pub rule: ValidationRule,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationFailure {
    /// Creates a failure for `rule`.
    #[must_use]
    pub fn new(rule: ValidationRule, reason: impl Into<String>) -> Self {
        Self {
            rule,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} check failed: {}", self.rule, self.reason)
    }
}

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Blank or inconsistent input while building a component.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Blank or invalid argument to a factory operation.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// XML root element is not the expected message type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected root element.
        expected: String,
        /// Actual root element.
        found: String,
    },

    /// Inbound message rejected.
    #[error("validation failed: {0}")]
    Validation(ValidationFailure),

    /// Metadata retrieval or message send failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Key or certificate unusable.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Algorithm URI without a local mapping.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No certificate available for a trust check.
    #[error("missing certificate: {0}")]
    MissingCertificate(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Metadata could not be used.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A validated message could not be handed to its next step.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl SamlError {
    /// Shorthand for a validation failure.
    #[must_use]
    pub fn validation(rule: ValidationRule, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationFailure::new(rule, reason))
    }

    /// Returns the failing rule for validation errors.
    #[must_use]
    pub fn validation_rule(&self) -> Option<ValidationRule> {
        match self {
            Self::Validation(failure) => Some(failure.rule),
            _ => None,
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the SAML top-level status code for this error.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Validation(failure) if failure.rule == ValidationRule::Version => {
                status_codes::VERSION_MISMATCH
            }
            Self::Validation(_)
            | Self::TypeMismatch { .. }
            | Self::IllegalArgument(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::UnsupportedAlgorithm(_) => status_codes::REQUESTER,
            _ => status_codes::RESPONDER,
        }
    }
}

impl From<ValidationFailure> for SamlError {
    fn from(failure: ValidationFailure) -> Self {
        Self::Validation(failure)
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<kc_crypto::SignatureError> for SamlError {
    fn from(err: kc_crypto::SignatureError) -> Self {
        match err {
            kc_crypto::SignatureError::UnsupportedAlgorithm(alg) => Self::UnsupportedAlgorithm(alg),
            other => Self::Crypto(other.to_string()),
        }
    }
}

impl From<kc_crypto::AlgorithmError> for SamlError {
    fn from(err: kc_crypto::AlgorithmError) -> Self {
        match err {
            kc_crypto::AlgorithmError::Unknown(uri) => Self::UnsupportedAlgorithm(uri),
        }
    }
}

impl From<reqwest::Error> for SamlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
