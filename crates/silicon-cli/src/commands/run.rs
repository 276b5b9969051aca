//! Attestation rounds against this machine.

use std::io::Write;
use std::thread;
use std::time::Duration;

use silicon_attest::{Attestor, ChallengeType, SensorSource, TimeSource};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, RunSummary};

/// Run command executor.
pub struct RunCommand<'a, C, S> {
    attestor: &'a Attestor<C, S>,
}

impl<'a, C: TimeSource, S: SensorSource> RunCommand<'a, C, S> {
    /// Create a new run command.
    #[must_use]
    pub const fn new(attestor: &'a Attestor<C, S>) -> Self {
        Self { attestor }
    }

    /// Execute the run command.
    ///
    /// Returns whether every round validated.
    ///
    /// # Errors
    ///
    /// Returns an error if output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &RunArgs,
    ) -> Result<bool, CliError> {
        let summary = self.collect(args);
        format.write(writer, &summary)?;
        Ok(summary.all_valid())
    }

    /// Run the requested rounds back to back.
    pub fn collect(&self, args: &RunArgs) -> RunSummary {
        let challenge_type = ChallengeType::from(args.challenge);
        let interval = Duration::from_millis(args.interval_ms);

        let rounds = (0..args.rounds)
            .map(|i| {
                if i > 0 && !interval.is_zero() {
                    thread::sleep(interval);
                }
                tracing::debug!(round = i + 1, total = args.rounds, "starting round");
                self.attestor.run(challenge_type)
            })
            .collect();

        let summary = RunSummary::new(rounds);
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            "attestation run finished"
        );
        summary
    }
}
