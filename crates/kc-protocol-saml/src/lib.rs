//! SAML 2.0 single logout security core.
//!
//! This crate covers the trust and message-handling side of SAML single
//! logout:
//!
//! - **Metadata** - parse entity descriptors from inline XML, files and URLs
//!   into an in-memory [`EntityCatalog`]
//! - **Signatures** - enveloped XML signatures and detached redirect-binding
//!   query signatures
//! - **Messages** - build, serialize and parse `LogoutRequest` and
//!   `LogoutResponse`, including SOAP envelopes
//! - **Validation** - a staged state machine that accepts or rejects inbound
//!   messages with the specific rule that failed
//! - **Bindings** - HTTP-POST, HTTP-Redirect and SOAP encodings
//!
//! # Architecture
//!
//! - [`metadata`] - [`EntityCatalog`] and [`MetadataIngester`]
//! - [`signature`] - [`SigningEngine`] and signature verification
//! - [`messages`] - [`MessageFactory`] and SOAP helpers
//! - [`validation`] - [`ValidatorBuilder`] and [`ValidationEngine`]
//! - [`bindings`] - POST and Redirect codecs and HTML templates
//! - [`transport`] - outbound HTTP delivery
//! - [`logout`] - [`LogoutService`], which ties the above together
//! - [`credentials`] - the key store collaborator
//! - [`error`] - [`SamlError`] and the validation failure taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use kc_protocol_saml::{SamlBinding, ValidatorBuilder};
//!
//! let validator = ValidatorBuilder::from_config(&config)
//!     .binding(SamlBinding::HttpPost)
//!     .destination("https://idp.example.com/slo")
//!     .trusted_certificate(record.signing_certificate()?)
//!     .build()?;
//! let accepted = validator.validate(&xml)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod credentials;
pub mod error;
pub mod logout;
pub mod messages;
pub mod metadata;
pub mod signature;
pub mod transport;
pub mod types;
pub mod validation;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use credentials::{Credential, CredentialStore, InMemoryCredentialStore};
pub use error::{SamlError, SamlResult, ValidationFailure, ValidationRule};
pub use logout::LogoutService;
pub use messages::MessageFactory;
pub use metadata::{EntityCatalog, EntityRecord, MetadataIngester, MetadataSource};
pub use signature::SigningEngine;
pub use transport::{HttpTransport, SamlTransport};
pub use types::*;
pub use validation::{SignaturePolicy, ValidationEngine, ValidatorBuilder};
