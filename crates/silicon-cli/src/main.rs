//! silicon-attest CLI binary entrypoint.
//!
//! Exit status: `0` when every round (or the validated document) passes,
//! `1` when validation fails, `2` on any other error.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use silicon_cli::cli::{Cli, Commands};
use silicon_cli::commands::{
    load_config, CapabilitiesCommand, ConfigCommand, RunCommand, ValidateCommand,
};
use silicon_cli::output::OutputFormat;
use silicon_cli::CliError;
use silicon_attest::{Attestor, Validator};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut stdout = io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Dispatch a parsed command line. Returns whether the outcome passed.
fn run<W: Write>(cli: Cli, writer: &mut W) -> Result<bool, CliError> {
    let format = OutputFormat::new(cli.format);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let attestor = Attestor::host(cli.clock.into(), config)?;
            RunCommand::new(&attestor).execute(writer, &format, &args)
        }
        Commands::Validate { file } => {
            let cmd = ValidateCommand::new(Validator::new(config.policy));
            cmd.execute(writer, &format, &file)
        }
        Commands::Capabilities => {
            let attestor = Attestor::host(cli.clock.into(), config)?;
            CapabilitiesCommand::new(&attestor).execute(writer, &format)?;
            Ok(true)
        }
        Commands::Config => {
            ConfigCommand::new(&config).execute(writer, &format)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silicon_cli::cli::Format;

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from(["silicon-attest", "run"]);
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["silicon-attest", "--format", "json", "config"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[test]
    fn run_config_command_prints_json() {
        let cli = Cli::parse_from(["silicon-attest", "--format", "json", "config"]);
        let mut buf = Vec::new();

        assert!(run(cli, &mut buf).expect("run"));
        let json: serde_json::Value = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(json["policy"]["pass_threshold"], 50.0);
    }

    #[test]
    fn run_with_missing_config_fails() {
        let cli = Cli::parse_from([
            "silicon-attest",
            "--config",
            "/nonexistent/attest.json",
            "config",
        ]);
        let mut buf = Vec::new();

        assert!(matches!(run(cli, &mut buf), Err(CliError::Config(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn run_validate_with_missing_file_fails() {
        let cli = Cli::parse_from(["silicon-attest", "validate", "/nonexistent/round.json"]);
        let mut buf = Vec::new();

        assert!(matches!(run(cli, &mut buf), Err(CliError::Input(_))));
    }

    #[test]
    fn run_capabilities_succeeds() {
        let cli = Cli::parse_from(["silicon-attest", "--clock", "monotonic", "capabilities"]);
        let mut buf = Vec::new();

        assert!(run(cli, &mut buf).expect("run"));
        let output = String::from_utf8(buf).expect("utf8");
        assert!(output.contains("Clock:            monotonic-ns"));
    }
}
