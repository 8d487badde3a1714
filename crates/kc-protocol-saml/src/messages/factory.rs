//! Logout message factory.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use kc_core::SharedClock;
use uuid::Uuid;

use crate::error::{SamlError, SamlResult, ValidationRule};
use crate::types::{
    LogoutRequest, LogoutResponse, MessageKind, NameId, ProtocolMessage, Status, StatusCode,
    SAMLP_NS, SAML_NS,
};
use crate::xml::{self, escape_text, XmlElement};

/// Builds logout messages and converts them to and from XML.
#[derive(Clone)]
pub struct MessageFactory {
    clock: SharedClock,
}

impl std::fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFactory").finish_non_exhaustive()
    }
}

fn require(value: &str, what: &str) -> SamlResult<()> {
    if value.trim().is_empty() {
        return Err(SamlError::IllegalArgument(format!("{what} must not be blank")));
    }
    Ok(())
}

fn message_id(explicit: Option<&str>) -> SamlResult<String> {
    match explicit {
        Some(id) => {
            require(id, "message ID")?;
            Ok(id.to_string())
        }
        None => Ok(format!("ID_{}", Uuid::new_v4())),
    }
}

/// Formats a timestamp the way it is written on the wire.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_instant(raw: &str, attribute: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            SamlError::validation(ValidationRule::Timestamp, format!("invalid {attribute}: {e}"))
        })
}

impl MessageFactory {
    /// Creates a factory stamping messages with `clock`.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Builds a logout request.
    ///
    /// `id` defaults to a fresh random identifier.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::IllegalArgument`] if the name ID, issuer, or an
    /// explicitly supplied ID is blank.
    pub fn build_logout_request(
        &self,
        name_id: NameId,
        issuer: &str,
        id: Option<&str>,
    ) -> SamlResult<LogoutRequest> {
        if name_id.is_blank() {
            return Err(SamlError::IllegalArgument("name ID must not be blank".to_string()));
        }
        require(issuer, "issuer")?;
        let id = message_id(id)?;
        Ok(LogoutRequest::new(id, issuer, name_id, self.clock.now()))
    }

    /// Builds a logout response.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::IllegalArgument`] if the issuer, status code, or
    /// an explicitly supplied ID is blank.
    pub fn build_logout_response(
        &self,
        issuer: &str,
        status_code: &str,
        in_response_to: Option<&str>,
        id: Option<&str>,
    ) -> SamlResult<LogoutResponse> {
        require(issuer, "issuer")?;
        require(status_code, "status code")?;
        let id = message_id(id)?;

        let mut response = LogoutResponse::new(id, issuer, Status::new(status_code), self.clock.now());
        if let Some(request_id) = in_response_to.filter(|r| !r.trim().is_empty()) {
            response = response.in_response_to(request_id);
        }
        Ok(response)
    }

    /// Serializes a message.
    #[must_use]
    pub fn to_xml(message: &ProtocolMessage) -> String {
        match message {
            ProtocolMessage::LogoutRequest(request) => Self::request_to_xml(request),
            ProtocolMessage::LogoutResponse(response) => Self::response_to_xml(response),
        }
    }

    /// Serializes a logout request.
    #[must_use]
    pub fn request_to_xml(request: &LogoutRequest) -> String {
        let mut out = open_root("LogoutRequest", &request.id, &request.version, request.issue_instant);
        push_attr(&mut out, "Destination", request.destination.as_deref());
        push_attr(&mut out, "Reason", request.reason.as_deref());
        push_attr(
            &mut out,
            "NotOnOrAfter",
            request.not_on_or_after.map(format_instant).as_deref(),
        );
        out.push('>');
        push_issuer(&mut out, &request.issuer);

        let name_id = &request.name_id;
        out.push_str("<saml:NameID");
        push_attr(&mut out, "Format", name_id.format.as_deref());
        push_attr(&mut out, "NameQualifier", name_id.name_qualifier.as_deref());
        push_attr(&mut out, "SPNameQualifier", name_id.sp_name_qualifier.as_deref());
        let _ = write!(out, ">{}</saml:NameID>", escape_text(&name_id.value));

        for index in &request.session_indexes {
            let _ = write!(out, "<samlp:SessionIndex>{}</samlp:SessionIndex>", escape_text(index));
        }
        out.push_str("</samlp:LogoutRequest>");
        out
    }

    /// Serializes a logout response.
    #[must_use]
    pub fn response_to_xml(response: &LogoutResponse) -> String {
        let mut out = open_root("LogoutResponse", &response.id, &response.version, response.issue_instant);
        push_attr(&mut out, "Destination", response.destination.as_deref());
        push_attr(&mut out, "InResponseTo", response.in_response_to.as_deref());
        out.push('>');
        push_issuer(&mut out, &response.issuer);

        out.push_str("<samlp:Status>");
        push_status_code(&mut out, &response.status.status_code);
        if let Some(message) = &response.status.status_message {
            let _ = write!(out, "<samlp:StatusMessage>{}</samlp:StatusMessage>", escape_text(message));
        }
        out.push_str("</samlp:Status></samlp:LogoutResponse>");
        out
    }

    /// Parses either kind of logout message.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::TypeMismatch`] for any other root element and
    /// parse errors for malformed XML.
    pub fn extract(document: &str) -> SamlResult<ProtocolMessage> {
        read_message(&xml::parse(document)?)
    }

    /// Parses a logout request.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::TypeMismatch`] if the root is not a
    /// `samlp:LogoutRequest`.
    pub fn extract_logout_request(document: &str) -> SamlResult<LogoutRequest> {
        let root = xml::parse(document)?;
        expect_root(&root, MessageKind::Request)?;
        read_request(&root)
    }

    /// Parses a logout response.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::TypeMismatch`] if the root is not a
    /// `samlp:LogoutResponse`.
    pub fn extract_logout_response(document: &str) -> SamlResult<LogoutResponse> {
        let root = xml::parse(document)?;
        expect_root(&root, MessageKind::Response)?;
        read_response(&root)
    }

    /// Wraps a message in a SOAP 1.1 envelope.
    #[must_use]
    pub fn wrap_in_soap_envelope(message_xml: &str) -> String {
        super::soap::wrap_in_soap_envelope(message_xml)
    }

    /// Returns the single element inside a SOAP 1.1 body.
    ///
    /// ## Errors
    ///
    /// See [`super::soap::unwrap_soap_body`].
    pub fn unwrap_soap_body(envelope: &str) -> SamlResult<String> {
        super::soap::unwrap_soap_body(envelope)
    }
}

fn open_root(name: &str, id: &str, version: &str, issue_instant: DateTime<Utc>) -> String {
    format!(
        r#"<samlp:{name} xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="{}" IssueInstant="{}""#,
        escape_text(id),
        escape_text(version),
        format_instant(issue_instant)
    )
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(out, r#" {name}="{}""#, escape_text(value));
    }
}

fn push_issuer(out: &mut String, issuer: &str) {
    let _ = write!(out, "<saml:Issuer>{}</saml:Issuer>", escape_text(issuer));
}

fn push_status_code(out: &mut String, code: &StatusCode) {
    let _ = write!(out, r#"<samlp:StatusCode Value="{}""#, escape_text(&code.value));
    match &code.status_code {
        Some(sub) => {
            out.push('>');
            push_status_code(out, sub);
            out.push_str("</samlp:StatusCode>");
        }
        None => out.push_str("/>"),
    }
}

fn expect_root(root: &XmlElement, kind: MessageKind) -> SamlResult<()> {
    let expected = match kind {
        MessageKind::Request => "LogoutRequest",
        MessageKind::Response => "LogoutResponse",
    };
    if root.is(SAMLP_NS, expected) {
        Ok(())
    } else {
        Err(SamlError::TypeMismatch {
            expected: format!("samlp:{expected}"),
            found: root.qualified_name().into_owned(),
        })
    }
}

fn issue_instant(root: &XmlElement) -> SamlResult<DateTime<Utc>> {
    let raw = root.attr("IssueInstant").ok_or_else(|| {
        SamlError::validation(ValidationRule::Timestamp, "IssueInstant is missing")
    })?;
    parse_instant(raw, "IssueInstant")
}

fn issuer(root: &XmlElement) -> String {
    root.children
        .iter()
        .find(|c| c.is(SAML_NS, "Issuer"))
        .map(|c| c.text_trimmed().to_string())
        .unwrap_or_default()
}

fn read_request(root: &XmlElement) -> SamlResult<LogoutRequest> {
    let name_id = root
        .children
        .iter()
        .find(|c| c.is(SAML_NS, "NameID"))
        .map(|element| NameId {
            value: element.text_trimmed().to_string(),
            format: element.attr("Format").map(str::to_string),
            name_qualifier: element.attr("NameQualifier").map(str::to_string),
            sp_name_qualifier: element.attr("SPNameQualifier").map(str::to_string),
        })
        .unwrap_or_else(|| NameId::new(""));

    Ok(LogoutRequest {
        id: root.attr("ID").unwrap_or_default().to_string(),
        version: root.attr("Version").unwrap_or_default().to_string(),
        issue_instant: issue_instant(root)?,
        issuer: issuer(root),
        destination: root.attr("Destination").map(str::to_string),
        name_id,
        session_indexes: root
            .children
            .iter()
            .filter(|c| c.is(SAMLP_NS, "SessionIndex"))
            .map(|c| c.text_trimmed().to_string())
            .collect(),
        reason: root.attr("Reason").map(str::to_string),
        not_on_or_after: root
            .attr("NotOnOrAfter")
            .map(|raw| parse_instant(raw, "NotOnOrAfter"))
            .transpose()?,
    })
}

/// Reads either kind of logout message from a parsed root element.
pub(crate) fn read_message(root: &XmlElement) -> SamlResult<ProtocolMessage> {
    if root.is(SAMLP_NS, "LogoutRequest") {
        Ok(read_request(root)?.into())
    } else if root.is(SAMLP_NS, "LogoutResponse") {
        Ok(read_response(root)?.into())
    } else {
        Err(SamlError::TypeMismatch {
            expected: "LogoutRequest or LogoutResponse".to_string(),
            found: root.qualified_name().into_owned(),
        })
    }
}

fn read_status_code(element: &XmlElement) -> StatusCode {
    StatusCode {
        value: element.attr("Value").unwrap_or_default().to_string(),
        status_code: element
            .children
            .iter()
            .find(|c| c.is(SAMLP_NS, "StatusCode"))
            .map(|sub| Box::new(read_status_code(sub))),
    }
}

fn read_response(root: &XmlElement) -> SamlResult<LogoutResponse> {
    let status_element = root.children.iter().find(|c| c.is(SAMLP_NS, "Status"));
    let status = Status {
        status_code: status_element
            .and_then(|s| s.children.iter().find(|c| c.is(SAMLP_NS, "StatusCode")))
            .map_or_else(|| StatusCode::new(""), read_status_code),
        status_message: status_element
            .and_then(|s| s.children.iter().find(|c| c.is(SAMLP_NS, "StatusMessage")))
            .map(|m| m.text_trimmed().to_string()),
    };

    Ok(LogoutResponse {
        id: root.attr("ID").unwrap_or_default().to_string(),
        version: root.attr("Version").unwrap_or_default().to_string(),
        issue_instant: issue_instant(root)?,
        issuer: issuer(root),
        in_response_to: root.attr("InResponseTo").map(str::to_string),
        destination: root.attr("Destination").map(str::to_string),
        status,
    })
}
