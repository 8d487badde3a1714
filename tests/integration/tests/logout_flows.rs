//! Full single logout exchanges between two parties.

use std::sync::Arc;

use chrono::Duration;
use kc_core::ManualClock;
use kc_protocol_saml::logout::{InboundMessage, LogoutReply, OutboundMessage};
use kc_protocol_saml::{
    EntityCatalog, HttpTransport, LogoutService, NameId, SamlBinding, Status, ValidationRule,
};
use url::form_urlencoded;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::common::{self, Party};

struct Federation {
    idp: Party,
    sp: Party,
    idp_service: LogoutService,
    sp_service: LogoutService,
    clock: Arc<ManualClock>,
}

/// An IdP and an SP that trust each other through metadata.
fn federation(idp_binding: SamlBinding, sp: Party, sp_binding: SamlBinding) -> anyhow::Result<Federation> {
    let idp = Party::generate("https://idp.example.org")?;
    let clock = common::clock();
    let transport = Arc::new(HttpTransport::new()?);

    let idp_catalog = Arc::new(EntityCatalog::new());
    for record in kc_protocol_saml::metadata::parse_metadata(&sp.metadata(sp_binding.uri()), common::epoch())? {
        idp_catalog.upsert(record.entity_id.clone(), record);
    }
    let sp_catalog = Arc::new(EntityCatalog::new());
    for record in kc_protocol_saml::metadata::parse_metadata(&idp.metadata(idp_binding.uri()), common::epoch())? {
        sp_catalog.upsert(record.entity_id.clone(), record);
    }

    Ok(Federation {
        idp_service: idp.service(idp_catalog, transport.clone(), clock.clone())?,
        sp_service: sp.service(sp_catalog, transport, clock.clone())?,
        idp,
        sp,
        clock,
    })
}

fn redirect_query(message: &OutboundMessage) -> anyhow::Result<String> {
    let OutboundMessage::Redirect { location, .. } = message else {
        anyhow::bail!("expected a redirect, got {message:?}");
    };
    let url = url::Url::parse(location)?;
    Ok(url.query().unwrap_or_default().to_string())
}

/// Turns an auto-submit form back into the body a browser would post.
fn posted_body(message: &OutboundMessage) -> anyhow::Result<String> {
    let OutboundMessage::PostForm { html } = message else {
        anyhow::bail!("expected a POST form, got {message:?}");
    };
    let field = |name: &str| -> Option<String> {
        let marker = format!(r#"name="{name}" value=""#);
        let start = html.find(&marker)? + marker.len();
        let end = html[start..].find('"')?;
        Some(html[start..start + end].to_string())
    };

    let mut body = form_urlencoded::Serializer::new(String::new());
    for name in ["SAMLRequest", "SAMLResponse", "RelayState"] {
        if let Some(value) = field(name).filter(|v| !v.is_empty()) {
            body.append_pair(name, &value);
        }
    }
    Ok(body.finish())
}

#[tokio::test]
async fn redirect_binding_round_trip() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpRedirect, sp, SamlBinding::HttpRedirect)?;

    let outbound = fx.idp_service.initiate_logout(
        &fx.sp.entity_id,
        NameId::email("alice@example.org"),
        &["session-1".to_string()],
        Some("https://idp.example.org/goodbye".to_string()),
    )?;

    let received = fx
        .sp_service
        .receive_request(InboundMessage::Redirect(&redirect_query(&outbound.message)?))?;
    assert!(received.signature_verified);
    assert_eq!(received.request.issuer, fx.idp.entity_id);
    assert_eq!(received.request.session_indexes, vec!["session-1".to_string()]);

    let LogoutReply::Browser(reply) = fx.sp_service.respond(&received, Status::success())? else {
        anyhow::bail!("expected a browser reply");
    };
    let completed = fx
        .idp_service
        .receive_response(InboundMessage::Redirect(&redirect_query(&reply)?))?;
    assert!(completed.response.is_success());
    let pending = completed.pending.expect("relay state still valid");
    assert_eq!(pending.request_id, outbound.request_id);
    assert_eq!(pending.return_to.as_deref(), Some("https://idp.example.org/goodbye"));
    Ok(())
}

#[tokio::test]
async fn post_binding_round_trip() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpPost, sp, SamlBinding::HttpPost)?;

    let outbound = fx
        .idp_service
        .initiate_logout(&fx.sp.entity_id, NameId::new("alice"), &[], None)?;
    let received = fx
        .sp_service
        .receive_request(InboundMessage::Post(&posted_body(&outbound.message)?))?;
    assert!(received.signature_verified);
    assert_eq!(received.relay_state.as_deref(), Some(outbound.relay_state.as_str()));

    let LogoutReply::Browser(reply) = fx.sp_service.respond(&received, Status::partial_logout())? else {
        anyhow::bail!("expected a browser reply");
    };
    let completed = fx
        .idp_service
        .receive_response(InboundMessage::Post(&posted_body(&reply)?))?;
    assert!(completed.response.is_success());
    assert!(completed.pending.is_some());
    Ok(())
}

#[tokio::test]
async fn tampered_redirect_signature_is_rejected() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpRedirect, sp, SamlBinding::HttpRedirect)?;

    let outbound = fx
        .idp_service
        .initiate_logout(&fx.sp.entity_id, NameId::new("alice"), &[], None)?;
    let query = redirect_query(&outbound.message)?;
    let tampered = query.replacen("RelayState=", "RelayState=x", 1);

    let err = fx
        .sp_service
        .receive_request(InboundMessage::Redirect(&tampered))
        .expect_err("tampered query must not validate");
    assert_eq!(err.validation_rule(), Some(ValidationRule::Signature));
    Ok(())
}

#[tokio::test]
async fn untrusted_signer_is_rejected() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpPost, sp, SamlBinding::HttpPost)?;

    // Same entity ID, different key: the SP trusts only the published one.
    let impostor = Party::generate("https://idp.example.org")?;
    let impostor_catalog = Arc::new(EntityCatalog::new());
    for record in kc_protocol_saml::metadata::parse_metadata(
        &fx.sp.metadata(SamlBinding::HttpPost.uri()),
        common::epoch(),
    )? {
        impostor_catalog.upsert(record.entity_id.clone(), record);
    }
    let impostor_service =
        impostor.service(impostor_catalog, Arc::new(HttpTransport::new()?), fx.clock.clone())?;

    let outbound = impostor_service.initiate_logout(&fx.sp.entity_id, NameId::new("alice"), &[], None)?;
    let err = fx
        .sp_service
        .receive_request(InboundMessage::Post(&posted_body(&outbound.message)?))
        .expect_err("impostor must be rejected");
    assert_eq!(err.validation_rule(), Some(ValidationRule::Signature));
    Ok(())
}

#[tokio::test]
async fn expired_relay_state_degrades_to_uncorrelated_completion() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpRedirect, sp, SamlBinding::HttpRedirect)?;

    let outbound = fx
        .idp_service
        .initiate_logout(&fx.sp.entity_id, NameId::new("alice"), &[], None)?;
    let received = fx
        .sp_service
        .receive_request(InboundMessage::Redirect(&redirect_query(&outbound.message)?))?;

    fx.clock.advance(Duration::minutes(11));
    let LogoutReply::Browser(reply) = fx.sp_service.respond(&received, Status::success())? else {
        anyhow::bail!("expected a browser reply");
    };
    let completed = fx
        .idp_service
        .receive_response(InboundMessage::Redirect(&redirect_query(&reply)?))?;
    assert!(completed.pending.is_none());
    assert!(completed.response.is_success());
    Ok(())
}

/// Plays the SP side of a SOAP exchange.
struct SoapPeer {
    service: LogoutService,
}

impl Respond for SoapPeer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let envelope = String::from_utf8_lossy(&request.body);
        let reply = self
            .service
            .receive_request(InboundMessage::Soap(&envelope))
            .and_then(|received| self.service.respond(&received, Status::success()));
        match reply {
            Ok(LogoutReply::Soap(envelope)) => ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/xml; charset=utf-8")
                .set_body_string(envelope),
            Ok(other) => ResponseTemplate::new(500).set_body_string(format!("{other:?}")),
            Err(err) => ResponseTemplate::new(500).set_body_string(err.to_string()),
        }
    }
}

#[tokio::test]
async fn soap_back_channel_logout() -> anyhow::Result<()> {
    common::init_tracing();
    let server = MockServer::start().await;
    let soap_url = format!("{}/slo/soap", server.uri());
    let sp = Party::generate("https://sp.example.org")?.with_slo_url(&soap_url);
    let fx = federation(SamlBinding::HttpRedirect, sp, SamlBinding::HttpRedirect)?;

    Mock::given(method("POST"))
        .and(path("/slo/soap"))
        .and(header("SOAPAction", kc_protocol_saml::transport::SOAP_ACTION))
        .and(header("Content-Type", "text/xml; charset=utf-8"))
        .respond_with(SoapPeer {
            service: fx.sp_service.clone(),
        })
        .expect(1)
        .mount(&server)
        .await;

    let response = fx
        .idp_service
        .back_channel_logout(&fx.sp.entity_id, &soap_url, NameId::new("alice"), &["s-9".to_string()])
        .await?;
    assert!(response.is_success());
    assert_eq!(response.issuer, fx.sp.entity_id);
    Ok(())
}

#[tokio::test]
async fn soap_peer_failure_surfaces_as_transport_error() -> anyhow::Result<()> {
    common::init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let sp = Party::generate("https://sp.example.org")?;
    let fx = federation(SamlBinding::HttpRedirect, sp, SamlBinding::HttpRedirect)?;
    let err = fx
        .idp_service
        .back_channel_logout(&fx.sp.entity_id, &server.uri(), NameId::new("alice"), &[])
        .await
        .expect_err("502 must fail");
    assert!(err.is_retryable());
    Ok(())
}
