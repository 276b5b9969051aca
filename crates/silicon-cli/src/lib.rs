//! # silicon-cli
//!
//! Command-line front end for `silicon-attest`.
//!
//! Provides commands for:
//! - Running attestation rounds on this machine
//! - Validating a serialized challenge and response
//! - Inspecting the host's measurement capabilities
//! - Printing the effective configuration
//!
//! Reports go to stdout; logs go to stderr so JSON output stays parseable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{ChallengeArg, ClockArg, Cli, Commands, Format, RunArgs};
pub use error::CliError;
pub use output::OutputFormat;
