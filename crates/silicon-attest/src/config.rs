//! Attestation configuration loaded from JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::challenge::{ChallengeType, EnvelopeTable};
use crate::error::AttestationError;
use crate::probes::ProbeConfig;
use crate::verification::ValidationPolicy;

/// Probe sizes, timing envelopes and validation policy.
///
/// Every section is optional in the file; missing sections and fields take
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    /// Probe buffer sizes and iteration counts.
    pub probes: ProbeConfig,
    /// Expected timing window per challenge type.
    pub envelopes: EnvelopeTable,
    /// Scoring thresholds and weights.
    pub policy: ValidationPolicy,
}

impl AttestConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed JSON or an inverted envelope, and the
    /// section's own error when a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, AttestationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the file cannot be read, otherwise as
    /// [`AttestConfig::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AttestationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| AttestationError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), "loaded attestation config");
        Ok(config)
    }

    /// Check every section.
    ///
    /// Envelopes are already checked on deserialization; this re-checks them
    /// for configs built in code.
    ///
    /// # Errors
    ///
    /// Returns the first section error found.
    pub fn validate(&self) -> Result<(), AttestationError> {
        self.probes.validate()?;
        self.policy.validate()?;
        for kind in ChallengeType::ALL {
            let envelope = self.envelopes.get(kind);
            if envelope.min_ticks() > envelope.max_ticks() {
                return Err(AttestationError::InvalidEnvelope {
                    min: envelope.min_ticks(),
                    max: envelope.max_ticks(),
                });
            }
        }
        Ok(())
    }
}
