//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use silicon_attest::{ChallengeType, ClockPreference};

/// silicon-attest - prove this machine is real hardware.
#[derive(Parser, Debug, Clone)]
#[command(name = "silicon-attest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file (probes, envelopes, policy).
    #[arg(short, long, env = "SILICON_ATTEST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Time source used for all measurements.
    #[arg(
        long,
        value_enum,
        env = "SILICON_ATTEST_CLOCK",
        default_value_t = ClockArg::Auto,
        global = true
    )]
    pub clock: ClockArg,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable report.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Time source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ClockArg {
    /// Cycle counter when available, else the monotonic clock.
    #[default]
    Auto,
    /// CPU cycle counter register.
    Cycle,
    /// OS monotonic clock in nanoseconds.
    Monotonic,
}

impl From<ClockArg> for ClockPreference {
    fn from(arg: ClockArg) -> Self {
        match arg {
            ClockArg::Auto => Self::Auto,
            ClockArg::Cycle => Self::Cycle,
            ClockArg::Monotonic => Self::Monotonic,
        }
    }
}

/// Challenge type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ChallengeArg {
    /// Cache tier timing.
    Cache,
    /// Scattered memory latency.
    Memory,
    /// Thermal sensor presence.
    Thermal,
    /// Hardware serial presence.
    Serial,
    /// Every probe.
    #[default]
    Composite,
}

impl From<ChallengeArg> for ChallengeType {
    fn from(arg: ChallengeArg) -> Self {
        match arg {
            ChallengeArg::Cache => Self::Cache,
            ChallengeArg::Memory => Self::Memory,
            ChallengeArg::Thermal => Self::Thermal,
            ChallengeArg::Serial => Self::Serial,
            ChallengeArg::Composite => Self::Composite,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Issue challenges to this machine and validate its responses.
    Run(RunArgs),

    /// Validate a saved `{ "challenge": .., "response": .. }` document.
    Validate {
        /// Path to the JSON document.
        file: PathBuf,
    },

    /// Show which measurement sources this host offers.
    Capabilities,

    /// Print the effective configuration.
    Config,
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Challenge type to issue.
    #[arg(long, value_enum, default_value_t = ChallengeArg::Composite)]
    pub challenge: ChallengeArg,

    /// Number of rounds to run back to back.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub rounds: u32,

    /// Pause between rounds in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            challenge: ChallengeArg::Composite,
            rounds: 1,
            interval_ms: 0,
        }
    }
}
