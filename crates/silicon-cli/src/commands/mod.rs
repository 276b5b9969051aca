//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`run`] - Attestation rounds on this machine
//! - [`validate`] - Offline validation of a saved response
//! - [`capabilities`] - Host measurement sources
//! - [`config`] - Effective configuration

pub mod capabilities;
pub mod config;
pub mod run;
pub mod validate;

pub use capabilities::CapabilitiesCommand;
pub use config::{load_config, ConfigCommand};
pub use run::RunCommand;
pub use validate::{AttestationDocument, ValidateCommand};
