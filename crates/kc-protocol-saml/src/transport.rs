//! Outbound message delivery.
//!
//! Sends are attempted once. Failures surface as [`SamlError::Transport`]
//! and retrying is left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use tracing::debug;

use crate::error::{SamlError, SamlResult};

/// `SOAPAction` value used for SAML SOAP binding requests.
pub const SOAP_ACTION: &str = "http://www.oasis-open.org/committees/security";

/// Default timeout for outbound sends.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client collaborator for outbound protocol messages.
#[async_trait]
pub trait SamlTransport: Send + Sync {
    /// POSTs a SOAP envelope and returns the response envelope.
    async fn send_soap(&self, url: &str, envelope: &str) -> SamlResult<String>;

    /// Issues a GET for a fully built redirect-binding URL.
    async fn send_redirect(&self, url: &str) -> SamlResult<()>;
}

/// [`SamlTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

fn soap_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("SOAPAction", HeaderValue::from_static(SOAP_ACTION));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=utf-8"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Transport`] if the HTTP client cannot be built.
    pub fn new() -> SamlResult<Self> {
        Self::with_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Creates a transport whose requests time out after `timeout`.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Transport`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> SamlResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SamlTransport for HttpTransport {
    async fn send_soap(&self, url: &str, envelope: &str) -> SamlResult<String> {
        debug!(url, "Sending SOAP message");
        let response = self
            .client
            .post(url)
            .headers(soap_headers())
            .body(envelope.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SamlError::Transport(format!(
                "SOAP endpoint {url} returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response.text().await?)
    }

    async fn send_redirect(&self, url: &str) -> SamlResult<()> {
        debug!(url, "Sending redirect-binding message");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(SamlError::Transport(format!(
                "redirect endpoint returned HTTP {}",
                status.as_u16()
            )))
        }
    }
}
