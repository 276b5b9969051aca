//! Hardware measurement probes.
//!
//! Each probe runs to completion on the calling thread. Scratch buffers live in
//! a [`Scratch`] allocated and touched before the timed window opens, and are
//! released when the execution ends. A probe that cannot measure returns its
//! sentinel (`0`, `None` or [`UNKNOWN_SERIAL`]) instead of failing; the
//! validator scores the absence.

pub mod cache;
pub mod jitter;
pub mod memory;
pub mod sensors;

use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeType;
use crate::error::AttestationError;

pub use cache::{cache_tiers, cache_tiers_in, CacheTiming};
pub use jitter::{instruction_jitter, normalized_variance, JITTER_SCALE, MIN_JITTER_SAMPLES};
pub use memory::{memory_pattern, memory_pattern_in};
pub use sensors::{hardware_serial, thermal_reading, HostSensors, SensorSource, UNKNOWN_SERIAL};

/// Cache line size assumed for strided access.
#[cfg(all(target_arch = "aarch64", target_vendor = "apple"))]
pub const CACHE_LINE_BYTES: usize = 128;
/// Cache line size assumed for strided access.
#[cfg(not(all(target_arch = "aarch64", target_vendor = "apple")))]
pub const CACHE_LINE_BYTES: usize = 64;

/// Sizes and iteration counts for the probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Buffer expected to fit in the first cache level (default: 16 KiB).
    pub l1_buffer_bytes: usize,
    /// Buffer that overflows the first level but fits a larger one (default: 512 KiB).
    pub l2_buffer_bytes: usize,
    /// Access stride, normally the cache line size.
    pub stride_bytes: usize,
    /// Buffer larger than every cache level (default: 16 MiB).
    pub memory_buffer_bytes: usize,
    /// Number of scattered reads in the memory probe.
    pub memory_reads: usize,
    /// Multiplier generating scattered offsets; should be prime.
    pub memory_prime: usize,
    /// Starting offset of the scattered walk.
    pub memory_offset: usize,
    /// Jitter samples (at least [`MIN_JITTER_SAMPLES`]).
    pub jitter_samples: usize,
    /// Inner loop iterations per jitter sample.
    pub jitter_iterations: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            l1_buffer_bytes: 16 * 1024,
            l2_buffer_bytes: 512 * 1024,
            stride_bytes: CACHE_LINE_BYTES,
            memory_buffer_bytes: 16 * 1024 * 1024,
            memory_reads: 1000,
            memory_prime: 7919,
            memory_offset: 0,
            jitter_samples: MIN_JITTER_SAMPLES,
            jitter_iterations: 1000,
        }
    }
}

impl ProbeConfig {
    /// Check the configuration for values that make probes meaningless.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidProbeConfig` describing the first problem.
    pub fn validate(&self) -> Result<(), AttestationError> {
        let fail = |msg: String| Err(AttestationError::InvalidProbeConfig(msg));

        if self.stride_bytes == 0 {
            return fail("stride_bytes must be positive".to_string());
        }
        if self.l1_buffer_bytes < self.stride_bytes {
            return fail(format!(
                "l1_buffer_bytes ({}) smaller than stride ({})",
                self.l1_buffer_bytes, self.stride_bytes
            ));
        }
        if self.l2_buffer_bytes <= self.l1_buffer_bytes {
            return fail(format!(
                "l2_buffer_bytes ({}) must exceed l1_buffer_bytes ({})",
                self.l2_buffer_bytes, self.l1_buffer_bytes
            ));
        }
        if self.memory_buffer_bytes == 0 || self.memory_reads == 0 {
            return fail("memory probe needs a non-empty buffer and at least one read".to_string());
        }
        if self.jitter_samples < MIN_JITTER_SAMPLES {
            return fail(format!(
                "jitter_samples ({}) below minimum {MIN_JITTER_SAMPLES}",
                self.jitter_samples
            ));
        }
        if self.jitter_iterations == 0 {
            return fail("jitter_iterations must be positive".to_string());
        }
        Ok(())
    }

    /// Small buffers for fast tests and benches.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            l1_buffer_bytes: 4 * 1024,
            l2_buffer_bytes: 64 * 1024,
            memory_buffer_bytes: 1024 * 1024,
            memory_reads: 256,
            jitter_iterations: 200,
            ..Self::default()
        }
    }
}

/// Allocate a zero-filled scratch buffer, or `None` if the allocator refuses.
///
/// The fill writes every page, so no first-touch fault lands inside a
/// measurement.
pub(crate) fn scratch(len: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, 0);
    Some(buf)
}

/// Probe buffers for one execution.
///
/// A missing buffer means the allocator refused; the probe that needs it
/// reports its sentinel.
#[derive(Debug, Default)]
pub struct Scratch {
    cache: Option<(Vec<u8>, Vec<u8>)>,
    memory: Option<Vec<u8>>,
}

impl Scratch {
    /// Buffers for the cache-tier probe.
    #[must_use]
    pub fn cache(config: &ProbeConfig) -> Self {
        Self {
            cache: scratch(config.l1_buffer_bytes).zip(scratch(config.l2_buffer_bytes)),
            memory: None,
        }
    }

    /// Buffer for the memory-pattern probe.
    #[must_use]
    pub fn memory(config: &ProbeConfig) -> Self {
        Self {
            cache: None,
            memory: scratch(config.memory_buffer_bytes).filter(|buf| !buf.is_empty()),
        }
    }

    /// Buffers for every probe a challenge type dispatches.
    #[must_use]
    pub fn for_challenge(challenge_type: ChallengeType, config: &ProbeConfig) -> Self {
        let wants_cache = matches!(challenge_type, ChallengeType::Cache | ChallengeType::Composite);
        let wants_memory =
            matches!(challenge_type, ChallengeType::Memory | ChallengeType::Composite);
        Self {
            cache: if wants_cache { Self::cache(config).cache } else { None },
            memory: if wants_memory { Self::memory(config).memory } else { None },
        }
    }

    /// Whether the cache-tier buffers are present.
    #[must_use]
    pub const fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether the memory-pattern buffer is present.
    #[must_use]
    pub const fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub(crate) fn cache_buffers(&mut self) -> Option<(&mut [u8], &mut [u8])> {
        self.cache
            .as_mut()
            .map(|(small, large)| (small.as_mut_slice(), large.as_mut_slice()))
    }

    pub(crate) fn memory_buffer(&self) -> Option<&[u8]> {
        self.memory.as_deref()
    }
}
