//! Validation inputs and the builder that checks them.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use kc_core::{SamlConfig, SharedClock, SystemClock};
use kc_crypto::Certificate;

use super::engine::ValidationEngine;
use crate::error::{SamlError, SamlResult, ValidationFailure};
use crate::types::{MessageKind, ProtocolMessage, SamlBinding};

/// Default maximum age of an inbound message.
pub const DEFAULT_ISSUE_TIMEOUT_SECS: i64 = 600;

/// Default tolerated clock skew.
pub const DEFAULT_CLOCK_JITTER_SECS: i64 = 30;

/// Caller-supplied rule run after the built-in required-field checks.
pub type CustomValidation = Arc<dyn Fn(&ProtocolMessage) -> Result<(), ValidationFailure> + Send + Sync>;

/// What to do with an embedded-signature message that carries no signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignaturePolicy {
    /// Reject unsigned messages.
    Required,
    /// Verify the signature only when one is present.
    #[default]
    IfPresent,
}

/// Detached signature data from a redirect-binding query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// Base64 signature value.
    pub signature: String,
    /// `SigAlg` URI.
    pub sig_alg: String,
    /// Exact query string the signature covers.
    pub signed_query: String,
}

/// Everything a validator checks a message against.
#[derive(Clone)]
pub struct ValidationContext {
    /// Binding the message arrived on.
    pub binding: SamlBinding,
    /// Endpoint the message was received at.
    pub destination: String,
    /// Expected message kind, if the endpoint accepts only one.
    pub expected_kind: Option<MessageKind>,
    /// Expected `InResponseTo` for responses.
    pub expected_in_response_to: Option<String>,
    /// Maximum message age.
    pub issue_timeout: Duration,
    /// Tolerated clock skew.
    pub clock_jitter: Duration,
    /// Redirect-binding signature data.
    pub redirect_signature: Option<RedirectSignature>,
    /// Policy for embedded signatures.
    pub signature_policy: SignaturePolicy,
    /// Certificate the issuer is trusted to sign with.
    pub trusted_certificate: Option<Certificate>,
    /// Caller rules.
    pub custom_validations: Vec<CustomValidation>,
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("binding", &self.binding)
            .field("destination", &self.destination)
            .field("expected_kind", &self.expected_kind)
            .field("expected_in_response_to", &self.expected_in_response_to)
            .field("issue_timeout", &self.issue_timeout)
            .field("clock_jitter", &self.clock_jitter)
            .field("signature_policy", &self.signature_policy)
            .field("has_redirect_signature", &self.redirect_signature.is_some())
            .field("has_trusted_certificate", &self.trusted_certificate.is_some())
            .field("custom_validations", &self.custom_validations.len())
            .finish()
    }
}

/// Builds a [`ValidationEngine`], rejecting incomplete configuration.
#[derive(Default)]
pub struct ValidatorBuilder {
    binding: Option<SamlBinding>,
    destination: Option<String>,
    expected_kind: Option<MessageKind>,
    expected_in_response_to: Option<String>,
    issue_timeout: Option<Duration>,
    clock_jitter: Option<Duration>,
    signature: Option<String>,
    sig_alg: Option<String>,
    signed_query: Option<String>,
    signature_policy: SignaturePolicy,
    trusted_certificate: Option<Certificate>,
    custom_validations: Vec<CustomValidation>,
    clock: Option<SharedClock>,
}

impl fmt::Debug for ValidatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorBuilder")
            .field("binding", &self.binding)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl ValidatorBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds timeouts and signature policy from configuration.
    #[must_use]
    pub fn from_config(config: &SamlConfig) -> Self {
        let policy = if config.require_signed_post {
            SignaturePolicy::Required
        } else {
            SignaturePolicy::IfPresent
        };
        Self::new()
            .issue_timeout(config.issue_timeout())
            .clock_jitter(config.clock_jitter())
            .signature_policy(policy)
    }

    /// Sets the binding.
    #[must_use]
    pub fn binding(mut self, binding: SamlBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Sets the endpoint URL the message was received at.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Accepts only messages of `kind`.
    #[must_use]
    pub fn expect_kind(mut self, kind: MessageKind) -> Self {
        self.expected_kind = Some(kind);
        self
    }

    /// Requires responses to answer `request_id`.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.expected_in_response_to = Some(request_id.into());
        self
    }

    /// Sets the maximum message age.
    #[must_use]
    pub fn issue_timeout(mut self, timeout: Duration) -> Self {
        self.issue_timeout = Some(timeout);
        self
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn clock_jitter(mut self, jitter: Duration) -> Self {
        self.clock_jitter = Some(jitter);
        self
    }

    /// Sets the redirect-binding signature data.
    #[must_use]
    pub fn redirect_signature(
        mut self,
        signature: impl Into<String>,
        sig_alg: impl Into<String>,
        signed_query: impl Into<String>,
    ) -> Self {
        self.signature = Some(signature.into());
        self.sig_alg = Some(sig_alg.into());
        self.signed_query = Some(signed_query.into());
        self
    }

    /// Sets the embedded-signature policy.
    #[must_use]
    pub fn signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.signature_policy = policy;
        self
    }

    /// Sets the certificate signatures are verified against.
    #[must_use]
    pub fn trusted_certificate(mut self, certificate: Certificate) -> Self {
        self.trusted_certificate = Some(certificate);
        self
    }

    /// Adds a caller rule, run after the built-in required-field checks.
    #[must_use]
    pub fn additional_validation<F>(mut self, check: F) -> Self
    where
        F: Fn(&ProtocolMessage) -> Result<(), ValidationFailure> + Send + Sync + 'static,
    {
        self.custom_validations.push(Arc::new(check));
        self
    }

    /// Sets the clock timestamps are checked against.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the validator.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if the binding or destination is
    /// unset, or, for the redirect binding, if the signature, signature
    /// algorithm or signed query string is blank.
    pub fn build(self) -> SamlResult<ValidationEngine> {
        let binding = self
            .binding
            .ok_or_else(|| SamlError::Configuration("validation binding is not set".to_string()))?;
        let destination = self
            .destination
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                SamlError::Configuration("validation destination is not set".to_string())
            })?;

        let redirect_signature = if binding == SamlBinding::HttpRedirect {
            for (value, name) in [
                (self.signature.as_deref(), "signature"),
                (self.sig_alg.as_deref(), "signature algorithm"),
                (self.signed_query.as_deref(), "signed query string"),
            ] {
                if !non_blank(value) {
                    return Err(SamlError::Configuration(format!(
                        "redirect binding validation requires a {name}"
                    )));
                }
            }
            Some(RedirectSignature {
                signature: self.signature.unwrap_or_default(),
                sig_alg: self.sig_alg.unwrap_or_default(),
                signed_query: self.signed_query.unwrap_or_default(),
            })
        } else {
            None
        };

        let context = ValidationContext {
            binding,
            destination,
            expected_kind: self.expected_kind,
            expected_in_response_to: self.expected_in_response_to,
            issue_timeout: self
                .issue_timeout
                .unwrap_or_else(|| Duration::seconds(DEFAULT_ISSUE_TIMEOUT_SECS)),
            clock_jitter: self
                .clock_jitter
                .unwrap_or_else(|| Duration::seconds(DEFAULT_CLOCK_JITTER_SECS)),
            redirect_signature,
            signature_policy: self.signature_policy,
            trusted_certificate: self.trusted_certificate,
            custom_validations: self.custom_validations,
        };
        Ok(ValidationEngine::new(
            context,
            self.clock.unwrap_or_else(SystemClock::shared),
        ))
    }
}
