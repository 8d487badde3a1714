//! HTTP-Redirect Binding implementation.
//!
//! Messages travel DEFLATE-compressed in URL query parameters. The detached
//! signature covers `SAMLRequest|SAMLResponse=..[&RelayState=..]&SigAlg=..`
//! using the encoded values exactly as they appear in the URL.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{SamlError, SamlResult};
use crate::signature::SigningEngine;
use crate::types::MessageKind;

use super::DecodedMessage;

/// Upper bound on an inflated redirect message.
pub const MAX_INFLATED_SIZE: u64 = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Deflates and base64-encodes a message (not yet URL-encoded).
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Deflate`] if compression fails.
    pub fn encode_message(xml: &str) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
    }

    /// Builds the URL-encoded `SAMLRequest|SAMLResponse[&RelayState]` part.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Deflate`] if compression fails.
    pub fn build_query(kind: MessageKind, xml: &str, relay_state: Option<&str>) -> SamlResult<String> {
        let mut query = format!(
            "{}={}",
            kind.param_name(),
            urlencoding::encode(&Self::encode_message(xml)?)
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        Ok(query)
    }

    /// Builds the full redirect URL, signing it when `signer` is given.
    ///
    /// Parameters appear in the order message, `RelayState`, `SigAlg`,
    /// `Signature`.
    ///
    /// ## Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode_url(
        destination: &str,
        kind: MessageKind,
        xml: &str,
        relay_state: Option<&str>,
        signer: Option<&SigningEngine>,
    ) -> SamlResult<String> {
        let mut query = Self::build_query(kind, xml, relay_state)?;
        if let Some(signer) = signer {
            let signature = signer.sign_query_string(&query)?;
            query = signature.signed_string;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature.signature));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a message from a full redirect URL.
    ///
    /// ## Errors
    ///
    /// See [`RedirectQuery::parse`] and [`RedirectQuery::decode`].
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::IllegalArgument(format!("invalid URL: {e}")))?;
        let query = parsed
            .query()
            .ok_or_else(|| SamlError::IllegalArgument("URL has no query".to_string()))?;
        RedirectQuery::parse(query)?.decode()
    }
}

/// Redirect-binding parameters with their raw, still-encoded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectQuery {
    /// Request or response.
    pub kind: MessageKind,
    /// Raw `SAMLRequest`/`SAMLResponse` value.
    pub message: String,
    /// Raw `RelayState` value.
    pub relay_state: Option<String>,
    /// Raw `SigAlg` value.
    pub sig_alg: Option<String>,
    /// Raw `Signature` value.
    pub signature: Option<String>,
}

impl RedirectQuery {
    /// Splits a raw query string without decoding the values.
    ///
    /// Unknown parameters are ignored.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::IllegalArgument`] if neither or both message
    /// parameters are present, or a SAML parameter repeats.
    pub fn parse(raw_query: &str) -> SamlResult<Self> {
        let raw_query = raw_query.strip_prefix('?').unwrap_or(raw_query);

        let mut message: Option<(MessageKind, &str)> = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                "SAMLRequest" | "SAMLResponse" => {
                    if message.is_some() {
                        return Err(SamlError::IllegalArgument(
                            "query carries more than one SAML message".to_string(),
                        ));
                    }
                    let kind = MessageKind::from_param_name(key)
                        .ok_or_else(|| SamlError::IllegalArgument(key.to_string()))?;
                    message = Some((kind, value));
                    continue;
                }
                "RelayState" => &mut relay_state,
                "SigAlg" => &mut sig_alg,
                "Signature" => &mut signature,
                _ => continue,
            };
            if slot.replace(value.to_string()).is_some() {
                return Err(SamlError::IllegalArgument(format!("duplicate {key} parameter")));
            }
        }

        let (kind, message) = message.ok_or_else(|| {
            SamlError::IllegalArgument("no SAMLRequest or SAMLResponse parameter".to_string())
        })?;

        Ok(Self {
            kind,
            message: message.to_string(),
            relay_state,
            sig_alg,
            signature,
        })
    }

    /// The string the detached signature covers, if `SigAlg` is present.
    #[must_use]
    pub fn signed_string(&self) -> Option<String> {
        let sig_alg = self.sig_alg.as_ref()?;
        let mut signed = format!("{}={}", self.kind.param_name(), self.message);
        if let Some(rs) = &self.relay_state {
            signed.push_str("&RelayState=");
            signed.push_str(rs);
        }
        signed.push_str("&SigAlg=");
        signed.push_str(sig_alg);
        Some(signed)
    }

    /// Decodes the message and parameters.
    ///
    /// ## Errors
    ///
    /// Returns decode errors for bad URL encoding, base64, DEFLATE data, or
    /// non-UTF-8 content.
    pub fn decode(&self) -> SamlResult<DecodedMessage> {
        let encoded = url_decode(&self.message)?;
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let compressed = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(deflate_decompress(&compressed)?)
            .map_err(|e| SamlError::XmlParse(format!("message is not UTF-8: {e}")))?;

        Ok(DecodedMessage {
            xml,
            kind: self.kind,
            relay_state: self.relay_state.as_deref().map(url_decode).transpose()?,
            signature: self.signature.as_deref().map(url_decode).transpose()?,
            sig_alg: self.sig_alg.as_deref().map(url_decode).transpose()?,
            signed_query: self.signed_string(),
        })
    }
}

/// Decodes one form-encoded query value.
fn url_decode(raw: &str) -> SamlResult<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|v| v.into_owned())
        .map_err(|e| SamlError::IllegalArgument(format!("invalid URL encoding: {e}")))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output over [`MAX_INFLATED_SIZE`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_INFLATED_SIZE + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("decompression error: {e}")))?;
    if decompressed.len() as u64 > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate("inflated message too large".to_string()));
    }
    Ok(decompressed)
}
