//! End-to-end integration tests.
//!
//! These tests drive the SAML logout core across crate boundaries, with
//! `wiremock` standing in for remote metadata hosts and peer SOAP endpoints.

mod common;
mod logout_flows;
mod metadata_ingestion;
