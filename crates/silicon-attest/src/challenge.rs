//! Challenge generation.
//!
//! A challenge names which hardware characteristics the prover must measure
//! and the window of total elapsed ticks a genuine machine is expected to land
//! in. The nonce makes every challenge unique; it is not a secret. It also
//! seeds the [`ChallengeMutation`] that perturbs the probes for this challenge.
//!
//! Envelope tables are written in ticks of a 33.3 MHz reference timebase
//! ([`REFERENCE_TICK_HZ`]). A generator whose clock reports its frequency
//! rescales each window to that clock's ticks; clocks with no known rate use
//! the table as is.
//!
//! # Example
//!
//! ```rust
//! use silicon_attest::challenge::{ChallengeGenerator, ChallengeType};
//! use silicon_attest::timesource::SteppingClock;
//!
//! let generator = ChallengeGenerator::new(SteppingClock::new(1_000, 1));
//! let challenge = generator.generate(ChallengeType::Cache);
//!
//! assert_eq!(challenge.challenge_type(), ChallengeType::Cache);
//! assert!(challenge.expected_min_ticks() <= challenge.expected_max_ticks());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::digest::{hex_bytes, to_hex};
use crate::error::AttestationError;
use crate::mutation::ChallengeMutation;
use crate::timesource::{Ticks, TimeSource};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 32;

/// Tick rate the envelope tables are expressed in.
pub const REFERENCE_TICK_HZ: u64 = 33_333_333;

/// What a challenge asks the prover to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    /// L1/L2 cache-tier latency.
    Cache,
    /// Scattered main-memory latency.
    Memory,
    /// Thermal sensor reading.
    Thermal,
    /// Hardware identifier.
    Serial,
    /// Every probe.
    Composite,
}

impl ChallengeType {
    /// All challenge types.
    pub const ALL: [Self; 5] = [
        Self::Cache,
        Self::Memory,
        Self::Thermal,
        Self::Serial,
        Self::Composite,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Memory => "memory",
            Self::Thermal => "thermal",
            Self::Serial => "serial",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown challenge type: {s}"))
    }
}

// =============================================================================
// Timing envelopes
// =============================================================================

/// Inclusive window of acceptable total response ticks. Always `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeBounds")]
pub struct TimingEnvelope {
    min_ticks: u32,
    max_ticks: u32,
}

#[derive(Deserialize)]
struct EnvelopeBounds {
    min_ticks: u32,
    max_ticks: u32,
}

impl TryFrom<EnvelopeBounds> for TimingEnvelope {
    type Error = AttestationError;

    fn try_from(bounds: EnvelopeBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.min_ticks, bounds.max_ticks)
    }
}

impl TimingEnvelope {
    /// Build an envelope in a const context; an inverted window fails compilation.
    #[must_use]
    pub const fn fixed(min_ticks: u32, max_ticks: u32) -> Self {
        assert!(min_ticks <= max_ticks, "timing envelope min exceeds max");
        Self {
            min_ticks,
            max_ticks,
        }
    }

    /// Build an envelope from runtime values.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidEnvelope` if `min_ticks > max_ticks`.
    pub fn new(min_ticks: u32, max_ticks: u32) -> Result<Self, AttestationError> {
        if min_ticks > max_ticks {
            return Err(AttestationError::InvalidEnvelope {
                min: min_ticks,
                max: max_ticks,
            });
        }
        Ok(Self {
            min_ticks,
            max_ticks,
        })
    }

    /// Lower bound.
    #[must_use]
    pub const fn min_ticks(&self) -> u32 {
        self.min_ticks
    }

    /// Upper bound.
    #[must_use]
    pub const fn max_ticks(&self) -> u32 {
        self.max_ticks
    }

    /// Whether `ticks` falls inside the window.
    #[must_use]
    pub const fn contains(&self, ticks: Ticks) -> bool {
        ticks >= self.min_ticks as u64 && ticks <= self.max_ticks as u64
    }

    /// The same window in ticks of a clock running at `hz`.
    ///
    /// `None` leaves the window untouched. Scaled bounds saturate at `u32::MAX`.
    #[must_use]
    pub fn at_frequency(self, hz: Option<u64>) -> Self {
        let Some(hz) = hz else {
            return self;
        };
        let scale = |ticks: u32| {
            let scaled = u128::from(ticks) * u128::from(hz) / u128::from(REFERENCE_TICK_HZ);
            u32::try_from(scaled).unwrap_or(u32::MAX)
        };
        Self {
            min_ticks: scale(self.min_ticks),
            max_ticks: scale(self.max_ticks),
        }
    }

    /// Smallest envelope containing both.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        let min = if self.min_ticks < other.min_ticks {
            self.min_ticks
        } else {
            other.min_ticks
        };
        let max = if self.max_ticks > other.max_ticks {
            self.max_ticks
        } else {
            other.max_ticks
        };
        Self::fixed(min, max)
    }
}

const CACHE_ENVELOPE: TimingEnvelope = TimingEnvelope::fixed(100, 50_000);
const MEMORY_ENVELOPE: TimingEnvelope = TimingEnvelope::fixed(1_000, 500_000);
const SENSOR_ENVELOPE: TimingEnvelope = TimingEnvelope::fixed(10, 100_000);
const COMPOSITE_ENVELOPE: TimingEnvelope =
    CACHE_ENVELOPE.union(MEMORY_ENVELOPE).union(SENSOR_ENVELOPE);

/// Expected timing envelope per challenge type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeTable {
    /// Cache challenges: narrow, low-latency window.
    pub cache: TimingEnvelope,
    /// Memory challenges: wider, higher-latency window.
    pub memory: TimingEnvelope,
    /// Thermal challenges.
    pub thermal: TimingEnvelope,
    /// Serial challenges.
    pub serial: TimingEnvelope,
    /// Composite challenges: the most tolerant window.
    pub composite: TimingEnvelope,
}

impl Default for EnvelopeTable {
    fn default() -> Self {
        Self {
            cache: CACHE_ENVELOPE,
            memory: MEMORY_ENVELOPE,
            thermal: SENSOR_ENVELOPE,
            serial: SENSOR_ENVELOPE,
            composite: COMPOSITE_ENVELOPE,
        }
    }
}

impl EnvelopeTable {
    /// Envelope for a challenge type.
    #[must_use]
    pub const fn get(&self, challenge_type: ChallengeType) -> TimingEnvelope {
        match challenge_type {
            ChallengeType::Cache => self.cache,
            ChallengeType::Memory => self.memory,
            ChallengeType::Thermal => self.thermal,
            ChallengeType::Serial => self.serial,
            ChallengeType::Composite => self.composite,
        }
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// A single attestation challenge. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChallengeRecord")]
pub struct Challenge {
    id: Uuid,
    #[serde(rename = "type")]
    challenge_type: ChallengeType,
    #[serde(with = "hex_bytes")]
    nonce: [u8; NONCE_LEN],
    timestamp: Ticks,
    issued_at: DateTime<Utc>,
    expected_min_ticks: u32,
    expected_max_ticks: u32,
    mutation: ChallengeMutation,
}

/// Unchecked wire form of a [`Challenge`].
#[derive(Deserialize)]
struct ChallengeRecord {
    id: Uuid,
    #[serde(rename = "type")]
    challenge_type: ChallengeType,
    #[serde(with = "hex_bytes")]
    nonce: [u8; NONCE_LEN],
    timestamp: Ticks,
    issued_at: DateTime<Utc>,
    expected_min_ticks: u32,
    expected_max_ticks: u32,
    #[serde(default)]
    mutation: Option<ChallengeMutation>,
}

impl TryFrom<ChallengeRecord> for Challenge {
    type Error = AttestationError;

    fn try_from(record: ChallengeRecord) -> Result<Self, Self::Error> {
        let envelope = TimingEnvelope::new(record.expected_min_ticks, record.expected_max_ticks)?;
        let challenge = Self {
            id: record.id,
            issued_at: record.issued_at,
            ..Self::new(record.challenge_type, record.nonce, record.timestamp, envelope)
        };
        match record.mutation {
            Some(claimed) if claimed != challenge.mutation => {
                Err(AttestationError::MutationMismatch { id: record.id })
            }
            _ => Ok(challenge),
        }
    }
}

impl Challenge {
    /// Build a challenge from its parts with a fresh id.
    #[must_use]
    pub fn new(
        challenge_type: ChallengeType,
        nonce: [u8; NONCE_LEN],
        timestamp: Ticks,
        envelope: TimingEnvelope,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            challenge_type,
            nonce,
            timestamp,
            issued_at: Utc::now(),
            expected_min_ticks: envelope.min_ticks(),
            expected_max_ticks: envelope.max_ticks(),
            mutation: ChallengeMutation::derive(&nonce),
        }
    }

    /// Unique challenge id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Challenge type.
    #[must_use]
    pub const fn challenge_type(&self) -> ChallengeType {
        self.challenge_type
    }

    /// Nonce bytes.
    #[must_use]
    pub const fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Clock ticks at generation.
    #[must_use]
    pub const fn timestamp(&self) -> Ticks {
        self.timestamp
    }

    /// Wall-clock time at generation.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Lower bound of the expected response time.
    #[must_use]
    pub const fn expected_min_ticks(&self) -> u32 {
        self.expected_min_ticks
    }

    /// Upper bound of the expected response time.
    #[must_use]
    pub const fn expected_max_ticks(&self) -> u32 {
        self.expected_max_ticks
    }

    /// The expected timing window.
    #[must_use]
    pub const fn envelope(&self) -> TimingEnvelope {
        TimingEnvelope {
            min_ticks: self.expected_min_ticks,
            max_ticks: self.expected_max_ticks,
        }
    }

    /// Probe perturbation derived from the nonce.
    #[must_use]
    pub const fn mutation(&self) -> &ChallengeMutation {
        &self.mutation
    }

    /// Nonce as lowercase hex.
    #[must_use]
    pub fn nonce_hex(&self) -> String {
        to_hex(&self.nonce)
    }
}

/// Issues challenges stamped by a [`TimeSource`].
#[derive(Debug)]
pub struct ChallengeGenerator<C> {
    clock: C,
    envelopes: EnvelopeTable,
}

impl<C: TimeSource> ChallengeGenerator<C> {
    /// Generator with the built-in envelope table.
    pub fn new(clock: C) -> Self {
        Self::with_envelopes(clock, EnvelopeTable::default())
    }

    /// Generator with a custom envelope table.
    pub const fn with_envelopes(clock: C, envelopes: EnvelopeTable) -> Self {
        Self { clock, envelopes }
    }

    /// The envelope table in use.
    pub const fn envelopes(&self) -> &EnvelopeTable {
        &self.envelopes
    }

    /// Generate a challenge of the given type, with its envelope in the
    /// generator clock's ticks.
    pub fn generate(&self, challenge_type: ChallengeType) -> Challenge {
        let envelope = self
            .envelopes
            .get(challenge_type)
            .at_frequency(self.clock.frequency_hz());
        let timestamp = self.clock.now();
        let challenge = Challenge::new(challenge_type, mix_nonce(timestamp), timestamp, envelope);
        tracing::debug!(
            id = %challenge.id(),
            challenge_type = %challenge_type,
            min_ticks = challenge.expected_min_ticks(),
            max_ticks = challenge.expected_max_ticks(),
            mutation = ?challenge.mutation(),
            "generated challenge"
        );
        challenge
    }
}

/// Random bytes XORed with the timestamp's bytes.
fn mix_nonce(timestamp: Ticks) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let stamp = timestamp.to_le_bytes();
    for (i, byte) in nonce.iter_mut().enumerate() {
        *byte ^= stamp[i % stamp.len()];
    }
    nonce
}
