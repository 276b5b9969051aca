//! Per-challenge probe mutation.
//!
//! Every challenge perturbs the probe parameters it asks for: the cache stride,
//! the starting offset of the scattered memory walk and the depth of the jitter
//! loop. The perturbation is derived from the nonce, so a prover cannot replay
//! measurements recorded for an earlier challenge, while any verifier holding
//! the challenge can recompute and check it.

use serde::{Deserialize, Serialize};

use crate::challenge::NONCE_LEN;
use crate::probes::ProbeConfig;

const DERIVE_CONTEXT: &str = "silicon-attest 2024 challenge mutation v1";

/// Cache stride multiplier range, in cache lines.
pub const STRIDE_LINES: (u32, u32) = (1, 4);

/// Jitter loop depth range, as a percentage of the configured iterations.
pub const JITTER_DEPTH_PERCENT: (u32, u32) = (100, 400);

/// Probe parameters that vary from one challenge to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeMutation {
    /// Multiplier applied to the configured cache stride.
    pub cache_stride_lines: u32,
    /// Starting offset of the scattered memory walk.
    pub memory_offset: u32,
    /// Jitter loop depth relative to the configured iterations.
    pub jitter_depth_percent: u32,
}

impl Default for ChallengeMutation {
    /// The identity mutation: probes run exactly as configured.
    fn default() -> Self {
        Self {
            cache_stride_lines: 1,
            memory_offset: 0,
            jitter_depth_percent: 100,
        }
    }
}

impl ChallengeMutation {
    /// Derive the mutation for a nonce.
    #[must_use]
    pub fn derive(nonce: &[u8; NONCE_LEN]) -> Self {
        let seed = blake3::derive_key(DERIVE_CONTEXT, nonce);
        let word = |i: usize| u32::from_be_bytes([seed[i], seed[i + 1], seed[i + 2], seed[i + 3]]);

        Self {
            cache_stride_lines: select(word(0), STRIDE_LINES),
            memory_offset: word(4),
            jitter_depth_percent: select(word(8), JITTER_DEPTH_PERCENT),
        }
    }

    /// Probe configuration with this mutation applied.
    #[must_use]
    pub fn apply(&self, config: &ProbeConfig) -> ProbeConfig {
        let lines = usize::try_from(self.cache_stride_lines.max(1)).unwrap_or(1);
        let depth = u64::from(config.jitter_iterations) * u64::from(self.jitter_depth_percent) / 100;

        ProbeConfig {
            stride_bytes: config.stride_bytes.saturating_mul(lines),
            memory_offset: usize::try_from(self.memory_offset).unwrap_or(0),
            jitter_iterations: u32::try_from(depth).unwrap_or(u32::MAX).max(1),
            ..config.clone()
        }
    }
}

/// Map `value` into the inclusive range.
const fn select(value: u32, (lo, hi): (u32, u32)) -> u32 {
    lo + value % (hi - lo + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let nonce = [0x5Au8; NONCE_LEN];
        assert_eq!(ChallengeMutation::derive(&nonce), ChallengeMutation::derive(&nonce));
    }

    #[test]
    fn test_different_nonces_mutate_probes_differently() {
        let a = ChallengeMutation::derive(&[0u8; NONCE_LEN]);
        let b = ChallengeMutation::derive(&[1u8; NONCE_LEN]);

        assert_ne!(a, b);
        let base = ProbeConfig::default();
        assert_ne!(a.apply(&base), b.apply(&base));
    }

    #[test]
    fn test_identity_mutation_keeps_config() {
        let config = ProbeConfig::compact();
        assert_eq!(ChallengeMutation::default().apply(&config), config);
    }

    #[test]
    fn test_apply_scales_probe_parameters() {
        let mutation = ChallengeMutation {
            cache_stride_lines: 3,
            memory_offset: 12_345,
            jitter_depth_percent: 250,
        };
        let config = ProbeConfig {
            stride_bytes: 64,
            jitter_iterations: 1000,
            ..ProbeConfig::default()
        };

        let mutated = mutation.apply(&config);

        assert_eq!(mutated.stride_bytes, 192);
        assert_eq!(mutated.memory_offset, 12_345);
        assert_eq!(mutated.jitter_iterations, 2_500);
        assert_eq!(mutated.memory_prime, config.memory_prime);
        assert_eq!(mutated.jitter_samples, config.jitter_samples);
    }

    #[test]
    fn test_select_bounds() {
        assert_eq!(select(0, (1, 4)), 1);
        assert_eq!(select(3, (1, 4)), 4);
        assert_eq!(select(4, (1, 4)), 1);
        assert_eq!(select(u32::MAX, (100, 400)), 100 + u32::MAX % 301);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_derived_mutation_stays_in_range(nonce in any::<[u8; NONCE_LEN]>()) {
            let mutation = ChallengeMutation::derive(&nonce);
            prop_assert!((STRIDE_LINES.0..=STRIDE_LINES.1).contains(&mutation.cache_stride_lines));
            prop_assert!(
                (JITTER_DEPTH_PERCENT.0..=JITTER_DEPTH_PERCENT.1)
                    .contains(&mutation.jitter_depth_percent)
            );
        }

        #[test]
        fn prop_mutated_config_stays_valid(nonce in any::<[u8; NONCE_LEN]>()) {
            let mutated = ChallengeMutation::derive(&nonce).apply(&ProbeConfig::compact());
            prop_assert!(mutated.validate().is_ok());
        }
    }
}
