//! Integration test crate for silicon-attest.
//!
//! This crate exists solely to run integration tests across the attestation
//! pipeline. It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
