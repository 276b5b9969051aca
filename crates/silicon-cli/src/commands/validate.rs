//! Offline validation of a saved challenge and response.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use silicon_attest::{AttestationError, Challenge, Response, Validator};

use crate::error::CliError;
use crate::output::{OutputFormat, Verdict};

/// A challenge and the response a prover returned for it.
///
/// A serialized round (`{challenge, response, result}`) also parses; the
/// stored result is ignored and recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationDocument {
    /// The issued challenge.
    pub challenge: Challenge,
    /// The prover's answer.
    pub response: Response,
}

impl AttestationDocument {
    /// Read a document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Input` if the file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| {
            CliError::Input(format!(
                "{}: {}",
                path.display(),
                AttestationError::from(e)
            ))
        })
    }
}

/// Validate command executor.
pub struct ValidateCommand {
    validator: Validator,
}

impl ValidateCommand {
    /// Create a new validate command.
    #[must_use]
    pub const fn new(validator: Validator) -> Self {
        Self { validator }
    }

    /// Score a document.
    #[must_use]
    pub fn verdict(&self, document: &AttestationDocument) -> Verdict {
        let challenge = &document.challenge;
        let response = &document.response;
        let verdict = Verdict {
            challenge_id: challenge.id(),
            challenge_type: challenge.challenge_type(),
            challenge_matches: response.challenge_id == challenge.id(),
            hash_matches: response.hash_matches(),
            result: self.validator.validate(challenge, response),
        };
        if !verdict.challenge_matches {
            tracing::warn!(
                expected = %challenge.id(),
                got = %response.challenge_id,
                "response answers a different challenge"
            );
        }
        if !verdict.hash_matches {
            tracing::warn!("response hash does not match its fields");
        }
        verdict
    }

    /// Execute the validate command.
    ///
    /// Returns whether the document was accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        path: &Path,
    ) -> Result<bool, CliError> {
        let document = AttestationDocument::from_file(path)?;
        let verdict = self.verdict(&document);
        format.write(writer, &verdict)?;
        Ok(verdict.accepted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use silicon_attest::{ChallengeType, Measurements, TimingEnvelope};
    use uuid::Uuid;

    fn document(challenge_id: Option<Uuid>) -> AttestationDocument {
        let challenge = Challenge::new(
            ChallengeType::Composite,
            [3u8; 32],
            11,
            TimingEnvelope::fixed(10, 500_000),
        );
        let response = Response::assemble(
            challenge_id.unwrap_or_else(|| challenge.id()),
            "rdtsc",
            11,
            40_000,
            Measurements {
                cache_l1_time: 50,
                cache_l2_time: 300,
                memory_time: 12_000,
                thermal_reading: Some(48),
                hardware_serial: "C02XK1ABJG5H".to_string(),
                jitter_variance: 35,
            },
        );
        AttestationDocument {
            challenge,
            response,
        }
    }

    fn write_document(dir: &Path, document: &AttestationDocument) -> std::path::PathBuf {
        let path = dir.join("round.json");
        fs::write(&path, serde_json::to_vec(document).expect("serialize")).expect("write");
        path
    }

    #[test]
    fn validate_accepts_genuine_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_document(dir.path(), &document(None));
        let mut buf = Vec::new();

        let accepted = ValidateCommand::new(Validator::default())
            .execute(&mut buf, &OutputFormat::new(Format::Json), &path)
            .expect("execute");

        assert!(accepted);
        let json: serde_json::Value = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(json["result"]["confidence_score"], 100.0);
        assert_eq!(json["hash_matches"], true);
    }

    #[test]
    fn validate_rejects_foreign_response() {
        let verdict = ValidateCommand::new(Validator::default()).verdict(&document(Some(Uuid::nil())));

        assert!(!verdict.challenge_matches);
        assert!(verdict.result.valid);
        assert!(!verdict.accepted());
    }

    #[test]
    fn validate_rejects_tampered_fields() {
        let mut doc = document(None);
        doc.response.jitter_variance = 900;

        let verdict = ValidateCommand::new(Validator::default()).verdict(&doc);

        assert!(!verdict.hash_matches);
        assert!(!verdict.accepted());
    }

    #[test]
    fn validate_reads_serialized_round() {
        let doc = document(None);
        let result = silicon_attest::validate(&doc.challenge, &doc.response);
        let round = silicon_attest::AttestationRound {
            challenge: doc.challenge,
            response: doc.response,
            result,
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("round.json");
        fs::write(&path, serde_json::to_vec(&round).expect("serialize")).expect("write");

        let parsed = AttestationDocument::from_file(&path).expect("parse");
        assert_eq!(parsed.response, round.response);
    }

    #[test]
    fn validate_missing_file_is_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AttestationDocument::from_file(&dir.path().join("absent.json"))
            .expect_err("must fail");
        assert!(matches!(err, CliError::Input(_)));
    }

    #[test]
    fn validate_inverted_envelope_is_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut json = serde_json::to_value(document(None)).expect("serialize");
        json["challenge"]["expected_min_ticks"] = 900_000.into();
        let path = dir.path().join("bad.json");
        fs::write(&path, json.to_string()).expect("write");

        let err = AttestationDocument::from_file(&path).expect_err("must fail");
        assert!(err.to_string().contains("invalid timing envelope"));
    }
}
