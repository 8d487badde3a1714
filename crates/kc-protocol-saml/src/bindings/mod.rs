//! SAML bindings implementation.
//!
//! This module implements the browser bindings used for logout:
//!
//! - **HTTP-POST Binding** - messages are base64-encoded and sent in an HTML form
//! - **HTTP-Redirect Binding** - messages are deflated, base64-encoded and
//!   URL-encoded, with a detached signature over the query string
//!
//! The SOAP binding lives in [`crate::messages::soap`] and
//! [`crate::transport`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use kc_protocol_saml::bindings::{HttpPostBinding, HttpRedirectBinding, HtmlTemplate};
//!
//! let url = HttpRedirectBinding::encode_url(dest, MessageKind::Request, &xml, Some("rs"), Some(&signer))?;
//! let html = HttpPostBinding::render_form(&HtmlTemplate::submit_form(), dest, MessageKind::Request, &signed_xml, None);
//! ```

mod post;
mod redirect;
mod template;

pub use post::*;
pub use redirect::*;
pub use template::*;

use crate::types::MessageKind;

/// A message decoded from a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// Request or response.
    pub kind: MessageKind,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// Base64 detached signature (redirect binding).
    pub signature: Option<String>,
    /// Signature algorithm URI (redirect binding).
    pub sig_alg: Option<String>,
    /// The exact query string the detached signature covers.
    pub signed_query: Option<String>,
}
