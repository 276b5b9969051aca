//! Error types for silicon-attest.
//!
//! Probe failures and failed validations are never errors: they surface as
//! sentinel measurements and as `valid = false` respectively.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while constructing attestation inputs.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// A timing envelope whose lower bound exceeds its upper bound.
    #[error("invalid timing envelope: min {min} exceeds max {max}")]
    InvalidEnvelope {
        /// Lower bound in ticks.
        min: u32,
        /// Upper bound in ticks.
        max: u32,
    },

    /// A challenge's recorded mutation disagrees with the one its nonce derives.
    #[error("challenge {id}: mutation does not match its nonce")]
    MutationMismatch {
        /// Id of the offending challenge.
        id: uuid::Uuid,
    },

    /// Validation policy constants are inconsistent.
    #[error("invalid validation policy: {0}")]
    InvalidPolicy(String),

    /// Probe configuration is unusable.
    #[error("invalid probe config: {0}")]
    InvalidProbeConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Config {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON input could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_envelope_display() {
        let err = AttestationError::InvalidEnvelope { min: 10, max: 5 };
        assert_eq!(err.to_string(), "invalid timing envelope: min 10 exceeds max 5");
    }

    #[test]
    fn test_mutation_mismatch_display() {
        let err = AttestationError::MutationMismatch { id: uuid::Uuid::nil() };
        assert_eq!(
            err.to_string(),
            "challenge 00000000-0000-0000-0000-000000000000: mutation does not match its nonce"
        );
    }

    #[test]
    fn test_parse_error_from_serde() {
        let serde_err = serde_json::from_str::<u32>("nope").expect_err("must fail");
        let err = AttestationError::from(serde_err);
        assert!(matches!(err, AttestationError::Parse(_)));
    }
}
