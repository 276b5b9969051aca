//! Host capability inspection.

use std::io::Write;

use silicon_attest::Attestor;

use crate::error::CliError;
use crate::output::OutputFormat;

/// Capabilities command executor.
pub struct CapabilitiesCommand<'a> {
    attestor: &'a Attestor,
}

impl<'a> CapabilitiesCommand<'a> {
    /// Create a new capabilities command.
    #[must_use]
    pub const fn new(attestor: &'a Attestor) -> Self {
        Self { attestor }
    }

    /// Execute the capabilities command.
    ///
    /// # Errors
    ///
    /// Returns an error if output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let capabilities = self.attestor.capabilities();
        tracing::debug!(clock = %capabilities.clock, "detected capabilities");
        format.write(writer, &capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use silicon_attest::{AttestConfig, ClockPreference};

    #[test]
    fn capabilities_json_reports_selected_clock() {
        let attestor =
            Attestor::host(ClockPreference::Monotonic, AttestConfig::default()).expect("attestor");
        let mut buf = Vec::new();
        CapabilitiesCommand::new(&attestor)
            .execute(&mut buf, &OutputFormat::new(Format::Json))
            .expect("execute");

        let json: serde_json::Value = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(json["clock"], "monotonic-ns");
        assert_eq!(json["cycle_accurate"], false);
        assert_eq!(json["os"], std::env::consts::OS);
    }
}
