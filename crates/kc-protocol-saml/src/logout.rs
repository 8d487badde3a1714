//! Single logout orchestration.
//!
//! [`LogoutService`] ties the catalog, signer, factory, relay state cache and
//! transport together for both halves of a logout exchange:
//!
//! - outbound requests go to the peer's single logout endpoint from metadata,
//!   or to an explicit SOAP location for back-channel logout
//! - inbound messages are decoded from their binding, validated against the
//!   issuer's published certificate, and correlated through relay state

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kc_cache::RelayStateCache;
use kc_core::{SamlConfig, SharedClock};
use kc_crypto::Certificate;
use tracing::{debug, info, warn};

use crate::bindings::{DecodedMessage, HtmlTemplates, HttpPostBinding, HttpRedirectBinding, RedirectQuery};
use crate::error::{SamlError, SamlResult, ValidationRule};
use crate::messages::{unwrap_soap_body, wrap_in_soap_envelope, MessageFactory};
use crate::metadata::{EntityCatalog, Endpoint};
use crate::signature::SigningEngine;
use crate::transport::SamlTransport;
use crate::types::{LogoutRequest, LogoutResponse, MessageKind, NameId, ProtocolMessage, SamlBinding, Status};
use crate::validation::{ValidatedMessage, ValidatorBuilder};

/// How often abandoned relay state is swept.
pub const RELAY_STATE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// State kept between sending a logout request and receiving its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogout {
    /// ID of the outstanding request.
    pub request_id: String,
    /// Entity the request was sent to.
    pub peer_entity_id: String,
    /// Where to send the user once logout completes.
    pub return_to: Option<String>,
}

/// A browser-bound message ready to hand to the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Send the user agent to this URL.
    Redirect {
        /// Fully encoded, signed URL.
        location: String,
        /// Fallback page for user agents that do not follow `Location`.
        page: String,
    },
    /// Serve this auto-submitting HTML form.
    PostForm {
        /// Rendered page.
        html: String,
    },
}

/// An outbound logout request and its relay state token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLogout {
    /// ID of the request.
    pub request_id: String,
    /// Relay state token identifying the pending logout.
    pub relay_state: String,
    /// What to send.
    pub message: OutboundMessage,
}

/// An inbound message in the form its binding delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessage<'a> {
    /// Raw query string of a redirect-binding GET.
    Redirect(&'a str),
    /// `application/x-www-form-urlencoded` body of a POST.
    Post(&'a str),
    /// SOAP envelope.
    Soap(&'a str),
}

impl InboundMessage<'_> {
    const fn binding(&self) -> SamlBinding {
        match self {
            Self::Redirect(_) => SamlBinding::HttpRedirect,
            Self::Post(_) => SamlBinding::HttpPost,
            Self::Soap(_) => SamlBinding::Soap,
        }
    }

    /// SOAP carries no parameter naming the message kind, so `expected` is
    /// assumed; validation rejects a mismatch.
    fn decode(&self, expected: MessageKind) -> SamlResult<DecodedMessage> {
        match self {
            Self::Redirect(query) => RedirectQuery::parse(query)?.decode(),
            Self::Post(body) => HttpPostBinding::decode_form(body),
            Self::Soap(envelope) => {
                let xml = unwrap_soap_body(envelope)?;
                Ok(DecodedMessage {
                    xml,
                    kind: expected,
                    relay_state: None,
                    signature: None,
                    sig_alg: None,
                    signed_query: None,
                })
            }
        }
    }
}

/// A validated inbound logout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedLogoutRequest {
    /// The request.
    pub request: LogoutRequest,
    /// Binding it arrived on.
    pub binding: SamlBinding,
    /// Relay state to echo back, if any.
    pub relay_state: Option<String>,
    /// Whether its signature was verified.
    pub signature_verified: bool,
}

/// A validated inbound logout response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedLogout {
    /// The response.
    pub response: LogoutResponse,
    /// The pending logout it answered, if relay state was still available.
    pub pending: Option<PendingLogout>,
}

/// The answer to an inbound logout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReply {
    /// Browser binding reply.
    Browser(OutboundMessage),
    /// SOAP envelope to return as the HTTP response body.
    Soap(String),
}

/// Drives logout exchanges with peers known to the catalog.
#[derive(Clone)]
pub struct LogoutService {
    entity_id: String,
    endpoint: String,
    config: SamlConfig,
    catalog: Arc<EntityCatalog>,
    signer: Arc<SigningEngine>,
    factory: MessageFactory,
    relay_states: RelayStateCache<PendingLogout>,
    templates: HtmlTemplates,
    transport: Arc<dyn SamlTransport>,
    clock: SharedClock,
}

impl fmt::Debug for LogoutService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutService")
            .field("entity_id", &self.entity_id)
            .field("endpoint", &self.endpoint)
            .field("pending", &self.relay_states.len())
            .finish_non_exhaustive()
    }
}

impl LogoutService {
    /// Creates a service issuing messages as `config.entity_id`.
    ///
    /// Inbound destinations are checked against the entity ID until
    /// [`Self::with_endpoint`] says otherwise. Inside a Tokio runtime this
    /// also starts a sweeper that drops abandoned relay state every
    /// [`RELAY_STATE_SWEEP_INTERVAL`].
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] for a blank entity ID, a zero
    /// relay state lifetime, or an unreadable template override.
    pub fn new(
        config: SamlConfig,
        catalog: Arc<EntityCatalog>,
        signer: Arc<SigningEngine>,
        transport: Arc<dyn SamlTransport>,
        clock: SharedClock,
    ) -> SamlResult<Self> {
        if config.entity_id.trim().is_empty() {
            return Err(SamlError::Configuration("entity ID is not set".to_string()));
        }
        let relay_states = RelayStateCache::new(config.relay_state_ttl(), Arc::clone(&clock))
            .map_err(|e| SamlError::Configuration(e.to_string()))?;
        if tokio::runtime::Handle::try_current().is_ok() {
            relay_states.spawn_sweeper(RELAY_STATE_SWEEP_INTERVAL);
        } else {
            debug!("No async runtime, relay state is evicted on access only");
        }
        let templates = HtmlTemplates::from_config(&config)?;

        Ok(Self {
            entity_id: config.entity_id.clone(),
            endpoint: config.entity_id.clone(),
            factory: MessageFactory::new(Arc::clone(&clock)),
            config,
            catalog,
            signer,
            relay_states,
            templates,
            transport,
            clock,
        })
    }

    /// Sets the URL this service receives logout messages at.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Relay state store, for sweeping or inspection.
    #[must_use]
    pub fn relay_states(&self) -> &RelayStateCache<PendingLogout> {
        &self.relay_states
    }

    fn logout_endpoint(&self, peer: &str) -> SamlResult<Endpoint> {
        let record = self
            .catalog
            .lookup(peer)
            .ok_or_else(|| SamlError::Metadata(format!("unknown entity {peer}")))?;
        if record.is_expired(self.clock.now()) {
            warn!(entity_id = peer, valid_until = %record.valid_until, "Using expired metadata");
        }
        record
            .single_logout_service
            .clone()
            .ok_or_else(|| SamlError::Metadata(format!("{peer} publishes no usable logout endpoint")))
    }

    fn trusted_certificate(&self, issuer: &str) -> Option<Certificate> {
        let record = self.catalog.lookup(issuer)?;
        match record.signing_certificate() {
            Ok(certificate) => {
                // Metadata, not the certificate's own dates, decides trust.
                if !certificate.is_valid_at(self.clock.now().timestamp()) {
                    warn!(
                        entity_id = issuer,
                        "Trusted signing certificate is outside its validity window"
                    );
                }
                Some(certificate)
            }
            Err(err) => {
                warn!(entity_id = issuer, error = %err, "Issuer has no usable signing certificate");
                None
            }
        }
    }

    /// Builds a signed logout request for the user agent to carry to `peer`.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Metadata`] if `peer` is unknown or publishes no
    /// browser logout endpoint, and signing or encoding errors.
    pub fn initiate_logout(
        &self,
        peer: &str,
        name_id: NameId,
        session_indexes: &[String],
        return_to: Option<String>,
    ) -> SamlResult<OutboundLogout> {
        let endpoint = self.logout_endpoint(peer)?;
        let mut request = self
            .factory
            .build_logout_request(name_id, &self.entity_id, None)?
            .with_destination(&endpoint.location);
        request.session_indexes.extend_from_slice(session_indexes);
        let request_id = request.id.clone();

        let relay_state = self.relay_states.put(PendingLogout {
            request_id: request_id.clone(),
            peer_entity_id: peer.to_string(),
            return_to,
        });
        let message = self.encode(&endpoint, &request.into(), Some(&relay_state))?;
        info!(peer, binding = ?endpoint.binding, "Initiated logout");

        Ok(OutboundLogout {
            request_id,
            relay_state,
            message,
        })
    }

    /// Sends a signed logout request over SOAP and validates the reply.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Transport`] if the send fails and a validation
    /// error if the reply does not check out.
    pub async fn back_channel_logout(
        &self,
        peer: &str,
        soap_location: &str,
        name_id: NameId,
        session_indexes: &[String],
    ) -> SamlResult<LogoutResponse> {
        let mut request = self
            .factory
            .build_logout_request(name_id, &self.entity_id, None)?
            .with_destination(soap_location);
        request.session_indexes.extend_from_slice(session_indexes);
        let request_id = request.id.clone();

        let signed = self.signer.sign_message(&request.into())?;
        let reply = self
            .transport
            .send_soap(soap_location, &wrap_in_soap_envelope(&signed))
            .await?;

        let xml = unwrap_soap_body(&reply)?;
        let validated = self.validate(
            &xml,
            SamlBinding::Soap,
            MessageKind::Response,
            None,
            Some(&request_id),
        )?;
        let response = into_response(validated.message)?;
        info!(peer, status = %response.status.status_code.value, "Back-channel logout answered");
        Ok(response)
    }

    /// Decodes and validates an inbound logout request.
    ///
    /// ## Errors
    ///
    /// Returns decode errors for a malformed binding payload and the
    /// validation error for a rejected message.
    pub fn receive_request(&self, inbound: InboundMessage<'_>) -> SamlResult<ReceivedLogoutRequest> {
        let binding = inbound.binding();
        let decoded = inbound.decode(MessageKind::Request)?;
        let validated = self.validate(&decoded.xml, binding, MessageKind::Request, Some(&decoded), None)?;
        let ProtocolMessage::LogoutRequest(request) = validated.message else {
            return Err(SamlError::validation(ValidationRule::Malformed, "expected a LogoutRequest"));
        };
        info!(issuer = %request.issuer, ?binding, "Received logout request");
        Ok(ReceivedLogoutRequest {
            request,
            binding,
            relay_state: decoded.relay_state,
            signature_verified: validated.signature_verified,
        })
    }

    /// Decodes and validates an inbound logout response, consuming the
    /// pending logout its relay state names.
    ///
    /// A missing or expired relay state is not an error: the response is
    /// still validated, without correlation, and `pending` is `None`.
    ///
    /// ## Errors
    ///
    /// Returns decode errors for a malformed binding payload and the
    /// validation error for a rejected message.
    pub fn receive_response(&self, inbound: InboundMessage<'_>) -> SamlResult<CompletedLogout> {
        let binding = inbound.binding();
        let decoded = inbound.decode(MessageKind::Response)?;
        // Peek only; the entry is consumed once the response is accepted.
        let token = decoded.relay_state.as_deref();
        let pending = token.and_then(|token| self.relay_states.take(token, false).ok());
        if pending.is_none() {
            debug!("No pending logout for inbound response; skipping correlation");
        }

        let expected = pending.as_ref().map(|p| p.request_id.as_str());
        let validated = self.validate(&decoded.xml, binding, MessageKind::Response, Some(&decoded), expected)?;
        let response = into_response(validated.message)?;
        if let Some(pending) = &pending {
            if pending.peer_entity_id != response.issuer {
                return Err(SamlError::validation(
                    ValidationRule::Correlation,
                    format!(
                        "response issued by {}, request was sent to {}",
                        response.issuer, pending.peer_entity_id
                    ),
                ));
            }
        }
        let pending = match (pending, token) {
            (Some(_), Some(token)) => self.relay_states.take(token, true).ok(),
            _ => None,
        };
        info!(issuer = %response.issuer, success = response.is_success(), "Logout completed");
        Ok(CompletedLogout { response, pending })
    }

    /// Builds the signed response to a received logout request.
    ///
    /// SOAP requests are answered with an envelope; browser requests on the
    /// requester's published logout endpoint.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Metadata`] if the requester publishes no logout
    /// endpoint for a browser reply, and signing or encoding errors.
    pub fn respond(&self, received: &ReceivedLogoutRequest, status: Status) -> SamlResult<LogoutReply> {
        let request = &received.request;
        let mut response = self.factory.build_logout_response(
            &self.entity_id,
            &status.status_code.value,
            Some(&request.id),
            None,
        )?;
        response.status = status;

        if matches!(received.binding, SamlBinding::Soap | SamlBinding::Paos) {
            let signed = self.signer.sign_message(&response.into())?;
            return Ok(LogoutReply::Soap(wrap_in_soap_envelope(&signed)));
        }

        let endpoint = self.logout_endpoint(&request.issuer)?;
        let response = response.with_destination(&endpoint.location);
        let message = self.encode(&endpoint, &response.into(), received.relay_state.as_deref())?;
        Ok(LogoutReply::Browser(message))
    }

    fn encode(
        &self,
        endpoint: &Endpoint,
        message: &ProtocolMessage,
        relay_state: Option<&str>,
    ) -> SamlResult<OutboundMessage> {
        let outbound = match endpoint.binding {
            SamlBinding::HttpRedirect => {
                let location = HttpRedirectBinding::encode_url(
                    &endpoint.location,
                    message.kind(),
                    &MessageFactory::to_xml(message),
                    relay_state,
                    Some(&self.signer),
                )?;
                let page = self.templates.redirect_page.render(Some(&location), None, None, None);
                OutboundMessage::Redirect { location, page }
            }
            SamlBinding::HttpPost => OutboundMessage::PostForm {
                html: HttpPostBinding::render_form(
                    &self.templates.submit_form,
                    &endpoint.location,
                    message.kind(),
                    &self.signer.sign_message(message)?,
                    relay_state,
                ),
            },
            other => {
                return Err(SamlError::Configuration(format!(
                    "{other:?} is not a browser binding"
                )))
            }
        };
        Ok(outbound)
    }

    fn validate(
        &self,
        xml: &str,
        binding: SamlBinding,
        kind: MessageKind,
        decoded: Option<&DecodedMessage>,
        in_response_to: Option<&str>,
    ) -> SamlResult<ValidatedMessage> {
        let issuer = MessageFactory::extract(xml)
            .map(|m| m.issuer().to_string())
            .unwrap_or_default();

        let mut builder = ValidatorBuilder::from_config(&self.config)
            .binding(binding)
            .destination(&self.endpoint)
            .expect_kind(kind)
            .clock(Arc::clone(&self.clock));
        if let Some(certificate) = self.trusted_certificate(&issuer) {
            builder = builder.trusted_certificate(certificate);
        }
        if let Some(request_id) = in_response_to {
            builder = builder.in_response_to(request_id);
        }
        if binding == SamlBinding::HttpRedirect {
            let detached = decoded.and_then(|d| Some((d.signature.as_ref()?, d.sig_alg.as_ref()?, d.signed_query.as_ref()?)));
            let Some((signature, sig_alg, signed_query)) = detached else {
                warn!(issuer = %issuer, "Rejected unsigned redirect-binding message");
                return Err(SamlError::validation(
                    ValidationRule::Signature,
                    "redirect-binding message is not signed",
                ));
            };
            builder = builder.redirect_signature(signature, sig_alg, signed_query);
        }
        builder.build()?.validate(xml)
    }
}

fn into_response(message: ProtocolMessage) -> SamlResult<LogoutResponse> {
    match message {
        ProtocolMessage::LogoutResponse(response) => Ok(response),
        ProtocolMessage::LogoutRequest(_) => Err(SamlError::validation(
            ValidationRule::Malformed,
            "expected a LogoutResponse",
        )),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use kc_core::ManualClock;
    use kc_crypto::{SecurityEngine, SignatureAlgorithm};
    use parking_lot::Mutex;

    use super::*;
    use crate::metadata::parse_metadata;
    use crate::test_support::{self, TestCredential};
    use crate::types::status_codes;

    const IDP: &str = "https://idp.example.com";
    const SP: &str = "https://sp.example.com";
    const IDP_SLO: &str = "https://idp.example.com/slo";

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn signer(credential: &TestCredential) -> SigningEngine {
        let credential = credential.credential("signing");
        SigningEngine::new(
            SecurityEngine::init().unwrap(),
            credential.signing_key().unwrap(),
            credential.certificate().unwrap(),
            SignatureAlgorithm::RsaSha256,
        )
        .unwrap()
    }

    /// Answers SOAP logout requests as the SP would.
    #[derive(Debug, Default)]
    struct SpTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SamlTransport for SpTransport {
        async fn send_soap(&self, url: &str, envelope: &str) -> SamlResult<String> {
            self.sent.lock().push((url.to_string(), envelope.to_string()));
            let request = MessageFactory::extract_logout_request(&unwrap_soap_body(envelope)?)?;
            let factory = MessageFactory::new(Arc::new(ManualClock::new(now())));
            let response = factory
                .build_logout_response(SP, status_codes::SUCCESS, Some(&request.id), None)?
                .with_destination(IDP_SLO);
            let signed = signer(test_support::other_rsa_credential()).sign_message(&response.into())?;
            Ok(wrap_in_soap_envelope(&signed))
        }

        async fn send_redirect(&self, _url: &str) -> SamlResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        service: LogoutService,
        transport: Arc<SpTransport>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(now()));
        let catalog = Arc::new(EntityCatalog::new());
        let metadata = test_support::sp_metadata(
            SP,
            &test_support::other_rsa_credential().certificate_b64(),
            None,
        );
        for record in parse_metadata(&metadata, now()).unwrap() {
            catalog.upsert(record.entity_id.clone(), record);
        }
        let config = SamlConfig {
            entity_id: IDP.to_string(),
            ..SamlConfig::default()
        };
        let transport = Arc::new(SpTransport::default());
        let service = LogoutService::new(
            config,
            catalog,
            Arc::new(signer(test_support::rsa_credential())),
            transport.clone(),
            clock.clone(),
        )
        .unwrap()
        .with_endpoint(IDP_SLO);
        Fixture {
            service,
            transport,
            clock,
        }
    }

    fn posted_response(response: LogoutResponse, relay_state: &str) -> String {
        format!(
            "SAMLResponse={}&RelayState={}",
            urlencoding::encode(&HttpPostBinding::encode_value(&sp_message(response.into()))),
            relay_state
        )
    }

    fn sp_message(message: ProtocolMessage) -> String {
        signer(test_support::other_rsa_credential())
            .sign_message(&message)
            .unwrap()
    }

    fn sp_request() -> LogoutRequest {
        LogoutRequest::new("_sp_req", SP, NameId::new("alice"), now()).with_destination(IDP_SLO)
    }

    #[test]
    fn initiates_signed_redirect_logout() {
        let fx = fixture();
        let outbound = fx
            .service
            .initiate_logout(SP, NameId::new("alice"), &["s1".to_string()], Some("/bye".to_string()))
            .unwrap();
        let OutboundMessage::Redirect { location, page } = &outbound.message else {
            panic!("expected a redirect");
        };
        assert!(location.starts_with("https://sp.example.com/slo/redirect?SAMLRequest="));
        assert!(location.contains("&SigAlg="));
        assert!(location.contains("&Signature="));
        assert!(page.contains("https://sp.example.com/slo/redirect?SAMLRequest="));

        let decoded = HttpRedirectBinding::decode_url(location).unwrap();
        assert_eq!(decoded.relay_state.as_deref(), Some(outbound.relay_state.as_str()));
        let request = MessageFactory::extract_logout_request(&decoded.xml).unwrap();
        assert_eq!(request.id, outbound.request_id);
        assert_eq!(request.session_indexes, vec!["s1".to_string()]);
        assert_eq!(fx.service.relay_states().len(), 1);
    }

    #[test]
    fn unknown_peer_is_a_metadata_error() {
        let fx = fixture();
        let err = fx
            .service
            .initiate_logout("https://nobody", NameId::new("alice"), &[], None)
            .unwrap_err();
        assert!(matches!(err, SamlError::Metadata(_)));
    }

    #[test]
    fn correlates_post_response_through_relay_state() {
        let fx = fixture();
        let outbound = fx
            .service
            .initiate_logout(SP, NameId::new("alice"), &[], Some("/bye".to_string()))
            .unwrap();

        let response = LogoutResponse::new("_sp_resp", SP, Status::success(), now())
            .in_response_to(&outbound.request_id)
            .with_destination(IDP_SLO);
        let body = format!(
            "SAMLResponse={}&RelayState={}",
            urlencoding::encode(&HttpPostBinding::encode_value(&sp_message(response.into()))),
            outbound.relay_state
        );
        let completed = fx.service.receive_response(InboundMessage::Post(&body)).unwrap();
        assert!(completed.response.is_success());
        assert_eq!(completed.pending.unwrap().return_to.as_deref(), Some("/bye"));

        // Relay state is single use.
        let replay = fx.service.receive_response(InboundMessage::Post(&body)).unwrap();
        assert!(replay.pending.is_none());
    }

    #[test]
    fn mismatched_in_response_to_is_rejected() {
        let fx = fixture();
        let outbound = fx
            .service
            .initiate_logout(SP, NameId::new("alice"), &[], None)
            .unwrap();
        let response = LogoutResponse::new("_sp_resp", SP, Status::success(), now())
            .in_response_to("_someone_else")
            .with_destination(IDP_SLO);
        let body = format!(
            "SAMLResponse={}&RelayState={}",
            urlencoding::encode(&HttpPostBinding::encode_value(&sp_message(response.into()))),
            outbound.relay_state
        );
        let err = fx.service.receive_response(InboundMessage::Post(&body)).unwrap_err();
        assert_eq!(err.validation_rule(), Some(ValidationRule::Correlation));
    }

    #[test]
    fn rejected_response_leaves_relay_state_for_the_genuine_one() {
        let fx = fixture();
        let outbound = fx
            .service
            .initiate_logout(SP, NameId::new("alice"), &[], Some("/bye".to_string()))
            .unwrap();

        let forged = LogoutResponse::new("_forged", SP, Status::success(), now())
            .in_response_to("_wrong")
            .with_destination(IDP_SLO);
        let err = fx
            .service
            .receive_response(InboundMessage::Post(&posted_response(forged, &outbound.relay_state)))
            .unwrap_err();
        assert_eq!(err.validation_rule(), Some(ValidationRule::Correlation));
        assert_eq!(fx.service.relay_states().len(), 1);

        let genuine = LogoutResponse::new("_sp_resp", SP, Status::success(), now())
            .in_response_to(&outbound.request_id)
            .with_destination(IDP_SLO);
        let completed = fx
            .service
            .receive_response(InboundMessage::Post(&posted_response(genuine, &outbound.relay_state)))
            .unwrap();
        assert_eq!(completed.pending.unwrap().request_id, outbound.request_id);
        assert!(fx.service.relay_states().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_relay_state_is_swept_without_reads() {
        let fx = fixture();
        for _ in 0..3 {
            fx.service
                .initiate_logout(SP, NameId::new("alice"), &[], None)
                .unwrap();
        }
        assert_eq!(fx.service.relay_states().len(), 3);

        fx.clock.advance(chrono::Duration::minutes(11));
        tokio::time::sleep(RELAY_STATE_SWEEP_INTERVAL + std::time::Duration::from_secs(1)).await;
        assert_eq!(fx.service.relay_states().len(), 0);
    }

    #[test]
    fn redirect_request_round_trip_with_reply() {
        let fx = fixture();
        let sp_signer = signer(test_support::other_rsa_credential());
        let url = HttpRedirectBinding::encode_url(
            IDP_SLO,
            MessageKind::Request,
            &MessageFactory::request_to_xml(&sp_request()),
            Some("sp-state"),
            Some(&sp_signer),
        )
        .unwrap();
        let query = url.split_once('?').unwrap().1;

        let received = fx.service.receive_request(InboundMessage::Redirect(query)).unwrap();
        assert!(received.signature_verified);
        assert_eq!(received.request.name_id.value, "alice");

        let LogoutReply::Browser(OutboundMessage::Redirect { location, .. }) =
            fx.service.respond(&received, Status::success()).unwrap()
        else {
            panic!("expected a redirect reply");
        };
        let decoded = HttpRedirectBinding::decode_url(&location).unwrap();
        assert_eq!(decoded.relay_state.as_deref(), Some("sp-state"));
        let response = MessageFactory::extract_logout_response(&decoded.xml).unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some("_sp_req"));
    }

    #[test]
    fn unsigned_redirect_request_is_rejected() {
        let fx = fixture();
        let url = HttpRedirectBinding::encode_url(
            IDP_SLO,
            MessageKind::Request,
            &MessageFactory::request_to_xml(&sp_request()),
            None,
            None,
        )
        .unwrap();
        let err = fx
            .service
            .receive_request(InboundMessage::Redirect(url.split_once('?').unwrap().1))
            .unwrap_err();
        assert_eq!(err.validation_rule(), Some(ValidationRule::Signature));
    }

    #[test]
    fn soap_request_is_answered_with_signed_envelope() {
        let fx = fixture();
        let envelope = wrap_in_soap_envelope(&sp_message(sp_request().into()));
        let received = fx.service.receive_request(InboundMessage::Soap(&envelope)).unwrap();
        assert!(received.signature_verified);

        let LogoutReply::Soap(reply) = fx.service.respond(&received, Status::partial_logout()).unwrap() else {
            panic!("expected a SOAP reply");
        };
        let body = unwrap_soap_body(&reply).unwrap();
        crate::signature::verify_xml_signature(&body, &test_support::rsa_credential().certificate())
            .unwrap();
        let response = MessageFactory::extract_logout_response(&body).unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some("_sp_req"));
        assert_eq!(response.status.status_code.value, status_codes::SUCCESS);
        assert_eq!(
            response.status.status_code.sub_status_value(),
            Some(status_codes::PARTIAL_LOGOUT)
        );
    }

    #[test]
    fn certificate_validity_does_not_override_metadata_trust() {
        let fx = fixture();
        // Generated certificates start today, after the fixture clock.
        let trusted = test_support::other_rsa_credential().certificate();
        assert!(!trusted.is_valid_at(now().timestamp()));

        let envelope = wrap_in_soap_envelope(&sp_message(sp_request().into()));
        let received = fx.service.receive_request(InboundMessage::Soap(&envelope)).unwrap();
        assert!(received.signature_verified);
    }

    #[tokio::test]
    async fn back_channel_logout_validates_reply() {
        let fx = fixture();
        let response = fx
            .service
            .back_channel_logout(SP, "https://sp.example.com/slo/soap", NameId::new("alice"), &[])
            .await
            .unwrap();
        assert!(response.is_success());

        let sent = fx.transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://sp.example.com/slo/soap");
        assert!(sent[0].1.contains("Signature"));
    }
}
