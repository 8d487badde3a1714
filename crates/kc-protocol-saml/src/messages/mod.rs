//! Logout message construction and (de)serialization.
//!
//! - [`MessageFactory`] builds `LogoutRequest`/`LogoutResponse` objects and
//!   converts them to and from XML
//! - [`soap`] wraps messages in SOAP 1.1 envelopes and unwraps them

mod factory;
pub mod soap;

pub use factory::*;
pub use soap::{unwrap_soap_body, wrap_in_soap_envelope};
