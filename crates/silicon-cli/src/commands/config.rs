//! Configuration loading and the `config` command.

use std::io::Write;
use std::path::Path;

use silicon_attest::AttestConfig;

use crate::error::CliError;
use crate::output::OutputFormat;

/// Load the config file if one was given, else the defaults.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is unreadable or invalid.
pub fn load_config(path: Option<&Path>) -> Result<AttestConfig, CliError> {
    match path {
        Some(path) => AttestConfig::from_file(path).map_err(CliError::from),
        None => Ok(AttestConfig::default()),
    }
}

/// Prints the effective configuration.
pub struct ConfigCommand<'a> {
    config: &'a AttestConfig,
}

impl<'a> ConfigCommand<'a> {
    /// Create a new config command.
    #[must_use]
    pub const fn new(config: &'a AttestConfig) -> Self {
        Self { config }
    }

    /// Execute the config command.
    ///
    /// # Errors
    ///
    /// Returns an error if output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        format.write(writer, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;

    #[test]
    fn load_config_without_path_is_default() {
        let config = load_config(None).expect("load");
        assert_eq!(config, AttestConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("attest.json");
        std::fs::write(&path, r#"{ "policy": { "pass_threshold": 75.0 } }"#).expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.policy.pass_threshold, 75.0);
    }

    #[test]
    fn load_config_missing_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(Some(&dir.path().join("nope.json"))).expect_err("must fail");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn config_command_json_roundtrips() {
        let config = AttestConfig::default();
        let mut buf = Vec::new();
        ConfigCommand::new(&config)
            .execute(&mut buf, &OutputFormat::new(Format::Json))
            .expect("execute");

        let back: AttestConfig = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(back, config);
    }
}
