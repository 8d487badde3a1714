//! Entity metadata: the catalog of trusted peers and how it gets filled.
//!
//! [`MetadataIngester`] parses inline XML, local files and remote URLs into
//! [`EntityRecord`]s and hands them to an upsert callback, normally
//! [`EntityCatalog::upsert_callback`].

mod catalog;
mod ingester;
mod parser;

pub use catalog::*;
pub use ingester::*;
pub use parser::*;
