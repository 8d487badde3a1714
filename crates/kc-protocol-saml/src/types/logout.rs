//! SAML Logout types.
//!
//! Single Logout (SLO) request and response messages, and the
//! [`ProtocolMessage`] union the validation pipeline operates on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, Status, SAML_VERSION};

/// Which side of an exchange a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A request (`LogoutRequest`).
    Request,
    /// A response (`LogoutResponse`).
    Response,
}

impl MessageKind {
    /// Returns the form/query parameter name used by browser bindings.
    #[must_use]
    pub const fn param_name(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }

    /// Parses a form/query parameter name.
    #[must_use]
    pub fn from_param_name(name: &str) -> Option<Self> {
        match name {
            "SAMLRequest" => Some(Self::Request),
            "SAMLResponse" => Some(Self::Response),
            _ => None,
        }
    }
}

/// SAML Logout Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The name identifier of the principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// User logout reason.
    pub const REASON_USER: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:user";

    /// Admin logout reason.
    pub const REASON_ADMIN: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:admin";

    /// Creates a version 2.0 logout request.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        issuer: impl Into<String>,
        name_id: NameId,
        issue_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant,
            issuer: issuer.into(),
            destination: None,
            name_id,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds a session index to terminate.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the expiry instant.
    #[must_use]
    pub fn with_not_on_or_after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(instant);
        self
    }
}

/// SAML Logout Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a version 2.0 logout response.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        issuer: impl Into<String>,
        status: Status,
        issue_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant,
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
        }
    }

    /// Sets the request ID this response is for.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A logout protocol message of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    /// A logout request.
    LogoutRequest(LogoutRequest),
    /// A logout response.
    LogoutResponse(LogoutResponse),
}

impl ProtocolMessage {
    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::LogoutRequest(_) => MessageKind::Request,
            Self::LogoutResponse(_) => MessageKind::Response,
        }
    }

    /// Returns the XML root element name.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::LogoutRequest(_) => "LogoutRequest",
            Self::LogoutResponse(_) => "LogoutResponse",
        }
    }

    /// Message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::LogoutRequest(m) => &m.id,
            Self::LogoutResponse(m) => &m.id,
        }
    }

    /// Issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        match self {
            Self::LogoutRequest(m) => &m.issuer,
            Self::LogoutResponse(m) => &m.issuer,
        }
    }

    /// Issue instant.
    #[must_use]
    pub fn issue_instant(&self) -> DateTime<Utc> {
        match self {
            Self::LogoutRequest(m) => m.issue_instant,
            Self::LogoutResponse(m) => m.issue_instant,
        }
    }

    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Self::LogoutRequest(m) => &m.version,
            Self::LogoutResponse(m) => &m.version,
        }
    }

    /// Declared destination, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::LogoutRequest(m) => m.destination.as_deref(),
            Self::LogoutResponse(m) => m.destination.as_deref(),
        }
    }

    /// InResponseTo of a response; always `None` for requests.
    #[must_use]
    pub fn in_response_to(&self) -> Option<&str> {
        match self {
            Self::LogoutRequest(_) => None,
            Self::LogoutResponse(m) => m.in_response_to.as_deref(),
        }
    }
}

impl From<LogoutRequest> for ProtocolMessage {
    fn from(request: LogoutRequest) -> Self {
        Self::LogoutRequest(request)
    }
}

impl From<LogoutResponse> for ProtocolMessage {
    fn from(response: LogoutResponse) -> Self {
        Self::LogoutResponse(response)
    }
}
