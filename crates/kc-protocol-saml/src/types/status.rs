//! SAML Status types.

use serde::{Deserialize, Serialize};

use super::status_codes;

/// SAML protocol status carried by a logout response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a status with the given top-level code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::new(code),
            status_message: None,
        }
    }

    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS)
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self::new(status_codes::REQUESTER).with_message(message)
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self::new(status_codes::RESPONDER).with_message(message)
    }

    /// Creates a partial logout status (success with a second-level code).
    #[must_use]
    pub fn partial_logout() -> Self {
        Self {
            status_code: StatusCode::success()
                .with_sub_status(StatusCode::new(status_codes::PARTIAL_LOGOUT)),
            status_message: Some("Some sessions could not be terminated".to_string()),
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code, optionally nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Creates a success status code.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS)
    }

    /// Adds a sub-status code.
    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }

    /// Returns true if this is a success status code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == status_codes::SUCCESS
    }

    /// Returns true if the value is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Returns the sub-status code value if present.
    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_ref().map(|s| s.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_success() {
        let status = Status::success();
        assert!(status.is_success());
        assert!(status.status_message.is_none());
    }

    #[test]
    fn status_error() {
        let status = Status::requester_error("Invalid request");
        assert!(!status.is_success());
        assert_eq!(status.status_message.as_deref(), Some("Invalid request"));

        let status = Status::responder_error("Session store unavailable");
        assert_eq!(status.status_code.value, status_codes::RESPONDER);
    }

    #[test]
    fn partial_logout_is_success_with_sub_status() {
        let status = Status::partial_logout();
        assert!(status.is_success());
        assert_eq!(
            status.status_code.sub_status_value(),
            Some(status_codes::PARTIAL_LOGOUT)
        );
    }

    #[test]
    fn blank_status_code() {
        assert!(StatusCode::new(" ").is_blank());
        assert!(!StatusCode::success().is_blank());
    }
}
