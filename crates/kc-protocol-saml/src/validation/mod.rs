//! Inbound message validation.
//!
//! A [`ValidatorBuilder`] front-loads configuration errors; the resulting
//! [`ValidationEngine`] walks every message through a fixed sequence of
//! [`ValidationStage`]s and stops at the first failure:
//!
//! ```text
//! NotStarted -> TimestampChecked -> VersionChecked -> RequiredFieldsChecked
//!   -> DestinationChecked -> SignatureChecked -> IdCorrelationChecked -> Accepted
//! ```
//!
//! Binding- and direction-specific rules come from a single dispatch table
//! ([`additional_checks`]) rather than per-combination validator types.

mod context;
mod dispatch;
mod engine;

pub use context::*;
pub use dispatch::*;
pub use engine::*;
