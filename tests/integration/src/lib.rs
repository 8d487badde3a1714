//! End-to-end tests for the SAML single logout core.
//!
//! The tests live under `tests/`; run them with
//! `cargo test -p kc-integration-tests`.
