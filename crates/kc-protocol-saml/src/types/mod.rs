//! SAML 2.0 logout types and protocol constants.

mod constants;
mod logout;
mod name_id;
mod status;

pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use status::*;
