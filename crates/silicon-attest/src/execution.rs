//! Challenge execution: run the probes and package a response.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::challenge::{Challenge, ChallengeType};
use crate::digest::{self, hex_bytes, FOLD_DIGEST_LEN};
use crate::probes::{
    cache_tiers_in, hardware_serial, instruction_jitter, memory_pattern_in, thermal_reading,
    ProbeConfig, Scratch, SensorSource, UNKNOWN_SERIAL,
};
use crate::timesource::{Ticks, TimeSource};

/// Raw probe results before they are sealed into a [`Response`].
///
/// The default value holds every probe's sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurements {
    /// Hot cache re-read ticks.
    pub cache_l1_time: u32,
    /// Evicted cache re-read ticks.
    pub cache_l2_time: u32,
    /// Scattered memory read ticks.
    pub memory_time: u32,
    /// Degrees Celsius, `None` when unavailable.
    pub thermal_reading: Option<i32>,
    /// Hardware identifier or [`UNKNOWN_SERIAL`].
    pub hardware_serial: String,
    /// Normalized jitter variance.
    pub jitter_variance: u32,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            cache_l1_time: 0,
            cache_l2_time: 0,
            memory_time: 0,
            thermal_reading: None,
            hardware_serial: UNKNOWN_SERIAL.to_string(),
            jitter_variance: 0,
        }
    }
}

/// The prover's answer to a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the challenge being answered.
    pub challenge_id: Uuid,
    /// Non-cryptographic mixing hash over every other field.
    #[serde(with = "hex_bytes")]
    pub response_hash: [u8; FOLD_DIGEST_LEN],
    /// Total ticks for the whole execution.
    pub timing_ticks: Ticks,
    /// Clock reading when execution started.
    pub timebase_value: Ticks,
    /// Hot cache re-read ticks.
    pub cache_l1_time: u32,
    /// Evicted cache re-read ticks.
    pub cache_l2_time: u32,
    /// Scattered memory read ticks.
    pub memory_time: u32,
    /// Degrees Celsius, `None` when unavailable.
    pub thermal_reading: Option<i32>,
    /// Hardware identifier, `"unknown"` when unavailable.
    pub hardware_serial: String,
    /// Normalized jitter variance.
    pub jitter_variance: u32,
    /// Name of the time source that produced the ticks.
    pub clock: String,
}

impl Response {
    /// Seal measurements into a response, computing its mixing hash.
    #[must_use]
    pub fn assemble(
        challenge_id: Uuid,
        clock: impl Into<String>,
        timebase_value: Ticks,
        timing_ticks: Ticks,
        measurements: Measurements,
    ) -> Self {
        let mut response = Self {
            challenge_id,
            response_hash: [0u8; FOLD_DIGEST_LEN],
            timing_ticks,
            timebase_value,
            cache_l1_time: measurements.cache_l1_time,
            cache_l2_time: measurements.cache_l2_time,
            memory_time: measurements.memory_time,
            thermal_reading: measurements.thermal_reading,
            hardware_serial: measurements.hardware_serial,
            jitter_variance: measurements.jitter_variance,
            clock: clock.into(),
        };
        response.response_hash = response.compute_hash();
        response
    }

    /// Canonical byte encoding of every field except the hash.
    #[must_use]
    pub fn to_mixing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.hardware_serial.len() + self.clock.len());
        bytes.extend_from_slice(self.challenge_id.as_bytes());
        bytes.extend_from_slice(&self.timing_ticks.to_le_bytes());
        bytes.extend_from_slice(&self.timebase_value.to_le_bytes());
        bytes.extend_from_slice(&self.cache_l1_time.to_le_bytes());
        bytes.extend_from_slice(&self.cache_l2_time.to_le_bytes());
        bytes.extend_from_slice(&self.memory_time.to_le_bytes());
        match self.thermal_reading {
            Some(celsius) => {
                bytes.push(1);
                bytes.extend_from_slice(&celsius.to_le_bytes());
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&(self.hardware_serial.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.hardware_serial.as_bytes());
        bytes.extend_from_slice(&self.jitter_variance.to_le_bytes());
        bytes.extend_from_slice(self.clock.as_bytes());
        bytes
    }

    fn compute_hash(&self) -> [u8; FOLD_DIGEST_LEN] {
        let mut hash = digest::fold_digest(&self.to_mixing_bytes());
        digest::mix_edges(&mut hash, self.timebase_value, self.timing_ticks);
        hash
    }

    /// Whether the stored hash still matches the fields.
    #[must_use]
    pub fn hash_matches(&self) -> bool {
        self.compute_hash() == self.response_hash
    }

    /// BLAKE3 commitment over the fields and mixing hash.
    #[must_use]
    pub fn commitment(&self) -> [u8; 32] {
        let mut bytes = self.to_mixing_bytes();
        bytes.extend_from_slice(&self.response_hash);
        digest::commitment(&bytes)
    }

    /// Mixing hash as lowercase hex.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        digest::to_hex(&self.response_hash)
    }

    /// L2/L1 ratio when both cache timings are positive.
    #[must_use]
    pub fn cache_ratio(&self) -> Option<f64> {
        (self.cache_l1_time > 0 && self.cache_l2_time > 0)
            .then(|| f64::from(self.cache_l2_time) / f64::from(self.cache_l1_time))
    }
}

/// Runs the probes a challenge asks for.
pub struct ResponseExecutor<'a> {
    clock: &'a dyn TimeSource,
    sensors: &'a dyn SensorSource,
    config: &'a ProbeConfig,
}

impl std::fmt::Debug for ResponseExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseExecutor")
            .field("clock", &self.clock.name())
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> ResponseExecutor<'a> {
    /// Create an executor.
    pub const fn new(
        clock: &'a dyn TimeSource,
        sensors: &'a dyn SensorSource,
        config: &'a ProbeConfig,
    ) -> Self {
        Self {
            clock,
            sensors,
            config,
        }
    }

    /// Execute a challenge.
    ///
    /// The challenge's mutation is applied to the probe configuration and
    /// scratch buffers are allocated before the start tick, so the timed
    /// window covers measurement only. Probes run one after another on the
    /// calling thread. Composite challenges run every probe; the jitter probe
    /// runs for every type. Never fails: an unavailable probe leaves its
    /// sentinel in place.
    pub fn execute(&self, challenge: &Challenge) -> Response {
        let kind = challenge.challenge_type();
        let probes = challenge.mutation().apply(self.config);
        let mut scratch = Scratch::for_challenge(kind, &probes);

        let start = self.clock.now();
        let mut measurements = Measurements::default();

        if matches!(kind, ChallengeType::Cache | ChallengeType::Composite) {
            let timing = cache_tiers_in(self.clock, &probes, &mut scratch);
            measurements.cache_l1_time = saturate(timing.l1);
            measurements.cache_l2_time = saturate(timing.l2);
        }
        if matches!(kind, ChallengeType::Memory | ChallengeType::Composite) {
            measurements.memory_time = saturate(memory_pattern_in(self.clock, &probes, &scratch));
        }
        if matches!(kind, ChallengeType::Thermal | ChallengeType::Composite) {
            measurements.thermal_reading = thermal_reading(self.sensors);
        }
        if matches!(kind, ChallengeType::Serial | ChallengeType::Composite) {
            measurements.hardware_serial = hardware_serial(self.sensors);
        }
        measurements.jitter_variance = instruction_jitter(self.clock, &probes);

        let end = self.clock.now();
        drop(scratch);
        let response = Response::assemble(
            challenge.id(),
            self.clock.name(),
            start,
            end.saturating_sub(start),
            measurements,
        );

        tracing::debug!(
            challenge_id = %challenge.id(),
            challenge_type = %kind,
            timing_ticks = response.timing_ticks,
            jitter = response.jitter_variance,
            "executed challenge"
        );
        response
    }
}

fn saturate(ticks: Ticks) -> u32 {
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
