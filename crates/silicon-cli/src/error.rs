//! CLI error types.

use std::fmt;

use silicon_attest::AttestationError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// Input document could not be read or parsed.
    Input(String),
    /// Output formatting error.
    Format(String),
    /// Error from the attestation library.
    Attestation(AttestationError),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Input(msg) => write!(f, "input error: {msg}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Attestation(e) => write!(f, "attestation error: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Attestation(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<AttestationError> for CliError {
    fn from(err: AttestationError) -> Self {
        match err {
            AttestationError::Config { .. }
            | AttestationError::InvalidEnvelope { .. }
            | AttestationError::InvalidPolicy(_)
            | AttestationError::InvalidProbeConfig(_) => Self::Config(err.to_string()),
            other => Self::Attestation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_config() {
        let err = CliError::Config("bad threshold".into());
        assert_eq!(err.to_string(), "configuration error: bad threshold");
    }

    #[test]
    fn cli_error_display_input() {
        let err = CliError::Input("round.json: not found".into());
        assert_eq!(err.to_string(), "input error: round.json: not found");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }

    #[test]
    fn cli_error_from_policy_error_is_config() {
        let err = CliError::from(AttestationError::InvalidPolicy("negative".into()));
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn cli_error_from_parse_error_keeps_source() {
        let serde_err = serde_json::from_str::<u32>("x").expect_err("must fail");
        let err = CliError::from(AttestationError::from(serde_err));
        assert!(matches!(err, CliError::Attestation(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
