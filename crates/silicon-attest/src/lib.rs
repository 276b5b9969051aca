//! # silicon-attest
//!
//! Challenge-response hardware attestation.
//!
//! A verifier issues a [`Challenge`] naming which physical characteristics to
//! measure. The prover runs the matching probes and answers with a
//! [`Response`]. The verifier scores the response into a [`ValidationResult`]
//! that says whether it came from genuine hardware rather than an emulator or
//! a generic virtual machine.
//!
//! This crate provides:
//!
//! - Time sources: cycle-counter registers with a monotonic fallback
//! - Probes: cache tiers, memory latency, instruction jitter, thermal, serial
//! - Challenges: typed challenges with per-type timing envelopes, rescaled to
//!   the measuring clock's rate, and nonce-derived probe mutations
//! - Validation: ordered heuristic scoring with a configurable policy
//!
//! The mixing hash in a response binds its fields together. It is not a
//! cryptographic signature and does not stop a prover from fabricating
//! measurements; use [`Response::commitment`] where a collision-resistant
//! digest is needed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use silicon_attest::{run_attestation, ChallengeType};
//!
//! let (challenge, response, result) = run_attestation(ChallengeType::Composite);
//!
//! println!(
//!     "{} challenge answered in {} ticks: score {:.0}, valid = {}",
//!     challenge.challenge_type(),
//!     response.timing_ticks,
//!     result.confidence_score,
//!     result.valid,
//! );
//! ```
//!
//! ## Injected clocks and sensors
//!
//! ```rust
//! use silicon_attest::probes::{ProbeConfig, SensorSource};
//! use silicon_attest::timesource::SteppingClock;
//! use silicon_attest::{AttestConfig, Attestor, ChallengeType};
//!
//! struct Lab;
//!
//! impl SensorSource for Lab {
//!     fn thermal_celsius(&self) -> Option<i32> {
//!         Some(38)
//!     }
//!
//!     fn hardware_serial(&self) -> Option<String> {
//!         Some("LAB-0001".to_string())
//!     }
//! }
//!
//! let config = AttestConfig {
//!     probes: ProbeConfig::compact(),
//!     ..AttestConfig::default()
//! };
//! let attestor = Attestor::new(SteppingClock::new(0, 10), Lab, config).unwrap();
//! let round = attestor.run(ChallengeType::Thermal);
//!
//! assert_eq!(round.response.thermal_reading, Some(38));
//! // A stepping clock has no jitter.
//! assert!(!round.result.jitter_natural);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod challenge;
pub mod config;
pub mod digest;
pub mod error;
pub mod execution;
pub mod mutation;
pub mod platform;
pub mod probes;
pub mod timesource;
pub mod verification;

use serde::{Deserialize, Serialize};

pub use challenge::{Challenge, ChallengeGenerator, ChallengeType, EnvelopeTable, TimingEnvelope};
pub use config::AttestConfig;
pub use error::AttestationError;
pub use execution::{Measurements, Response, ResponseExecutor};
pub use mutation::ChallengeMutation;
pub use platform::Capabilities;
pub use probes::{HostSensors, ProbeConfig, SensorSource};
pub use timesource::{ClockPreference, HostClock, Ticks, TimeSource};
pub use verification::{
    validate, Deduction, DeductionKind, ValidationPolicy, ValidationResult, Validator,
};

/// One complete challenge, response and verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRound {
    /// The issued challenge.
    pub challenge: Challenge,
    /// The prover's answer.
    pub response: Response,
    /// The verifier's verdict.
    pub result: ValidationResult,
}

/// Runs the full generate, execute and validate pipeline on one thread.
#[derive(Debug)]
pub struct Attestor<C = HostClock, S = HostSensors> {
    clock: C,
    sensors: S,
    config: AttestConfig,
}

impl Attestor {
    /// Attestor on the host's best clock and sensors with default settings.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            clock: HostClock::detect(),
            sensors: HostSensors::new(),
            config: AttestConfig::default(),
        }
    }

    /// Attestor on host hardware with an explicit clock preference and config.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn host(
        preference: ClockPreference,
        config: AttestConfig,
    ) -> Result<Self, AttestationError> {
        Self::new(HostClock::with_preference(preference), HostSensors::new(), config)
    }

    /// Capability table of the host this attestor measures.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::detect(&self.clock, &self.sensors)
    }
}

impl<C: TimeSource, S: SensorSource> Attestor<C, S> {
    /// Attestor over an arbitrary clock and sensor source.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(clock: C, sensors: S, config: AttestConfig) -> Result<Self, AttestationError> {
        config.validate()?;
        Ok(Self {
            clock,
            sensors,
            config,
        })
    }

    /// The active configuration.
    pub const fn config(&self) -> &AttestConfig {
        &self.config
    }

    /// The clock used for stamping and timing.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Issue a challenge without executing it.
    pub fn challenge(&self, challenge_type: ChallengeType) -> Challenge {
        ChallengeGenerator::with_envelopes(&self.clock, self.config.envelopes.clone())
            .generate(challenge_type)
    }

    /// Execute a challenge on this host.
    pub fn respond(&self, challenge: &Challenge) -> Response {
        ResponseExecutor::new(&self.clock, &self.sensors, &self.config.probes).execute(challenge)
    }

    /// Score a response under this attestor's policy.
    pub fn verify(&self, challenge: &Challenge, response: &Response) -> ValidationResult {
        Validator::new(self.config.policy.clone()).validate(challenge, response)
    }

    /// Run one full round.
    ///
    /// Scratch buffers from the probes are released before this returns.
    pub fn run(&self, challenge_type: ChallengeType) -> AttestationRound {
        let challenge = self.challenge(challenge_type);
        let response = self.respond(&challenge);
        let result = self.verify(&challenge, &response);

        tracing::info!(
            challenge_type = %challenge_type,
            timing_ticks = response.timing_ticks,
            score = result.confidence_score,
            valid = result.valid,
            "attestation round complete"
        );
        if !result.failure_reason.is_empty() {
            tracing::debug!(reason = %result.failure_reason, "first failed check");
        }

        AttestationRound {
            challenge,
            response,
            result,
        }
    }
}

/// Generate, execute and validate one challenge on this host with defaults.
#[must_use]
pub fn run_attestation(challenge_type: ChallengeType) -> (Challenge, Response, ValidationResult) {
    let round = Attestor::detect().run(challenge_type);
    (round.challenge, round.response, round.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timesource::SteppingClock;

    struct Lab {
        thermal: Option<i32>,
        serial: Option<&'static str>,
    }

    impl SensorSource for Lab {
        fn thermal_celsius(&self) -> Option<i32> {
            self.thermal
        }

        fn hardware_serial(&self) -> Option<String> {
            self.serial.map(str::to_string)
        }
    }

    fn compact() -> AttestConfig {
        AttestConfig {
            probes: ProbeConfig::compact(),
            ..AttestConfig::default()
        }
    }

    #[test]
    fn test_round_links_challenge_and_response() {
        let sensors = Lab {
            thermal: Some(40),
            serial: Some("SN-12345"),
        };
        let attestor = Attestor::new(SteppingClock::new(0, 1), sensors, compact()).expect("new");
        let round = attestor.run(ChallengeType::Serial);

        assert_eq!(round.response.challenge_id, round.challenge.id());
        assert_eq!(round.challenge.challenge_type(), ChallengeType::Serial);
        assert!(round.response.hash_matches());
        assert!(round.result.hardware_match);
    }

    #[test]
    fn test_stepping_clock_round_is_penalized_for_jitter() {
        let sensors = Lab {
            thermal: Some(40),
            serial: Some("SN-12345"),
        };
        let attestor = Attestor::new(SteppingClock::new(0, 1), sensors, compact()).expect("new");
        let round = attestor.run(ChallengeType::Composite);

        assert!(!round.result.jitter_natural);
        assert!(round
            .result
            .deductions
            .iter()
            .any(|d| d.kind == DeductionKind::LowJitter));
    }

    #[test]
    fn test_custom_policy_is_used() {
        let sensors = Lab {
            thermal: None,
            serial: None,
        };
        let mut config = compact();
        config.policy.pass_threshold = 0.0;
        let attestor = Attestor::new(SteppingClock::new(0, 1), sensors, config).expect("new");

        assert!(attestor.run(ChallengeType::Thermal).result.valid);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = compact();
        config.probes.jitter_samples = 2;
        let sensors = Lab {
            thermal: None,
            serial: None,
        };

        assert!(matches!(
            Attestor::new(SteppingClock::new(0, 1), sensors, config),
            Err(AttestationError::InvalidProbeConfig(_))
        ));
    }

    #[test]
    fn test_nanosecond_host_clock_gets_rescaled_envelope() {
        let sensors = Lab {
            thermal: None,
            serial: None,
        };
        let clock = HostClock::with_preference(ClockPreference::Monotonic);
        let attestor = Attestor::new(clock, sensors, compact()).expect("new");
        let challenge = attestor.challenge(ChallengeType::Cache);

        assert_eq!(challenge.expected_min_ticks(), 3_000);
        assert_eq!(challenge.expected_max_ticks(), 1_500_000);
    }

    #[test]
    fn test_round_serializes() {
        let sensors = Lab {
            thermal: Some(30),
            serial: Some("SN-12345"),
        };
        let attestor = Attestor::new(SteppingClock::new(0, 1), sensors, compact()).expect("new");
        let round = attestor.run(ChallengeType::Cache);

        let json = serde_json::to_string(&round).expect("serialize");
        let back: AttestationRound = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, round);
    }
}
