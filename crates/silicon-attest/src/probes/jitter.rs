//! Instruction-pipeline jitter probe.
//!
//! Real silicon never runs the same loop in exactly the same number of ticks:
//! interrupts, frequency scaling and pipeline state add noise. A naive emulator
//! driven by a virtual clock is far more regular.

use std::hint::black_box;

use super::ProbeConfig;
use crate::timesource::{Ticks, TimeSource};

/// Minimum number of samples the probe takes.
pub const MIN_JITTER_SAMPLES: usize = 16;

/// Fixed-point scale for [`normalized_variance`].
pub const JITTER_SCALE: u128 = 1000;

/// Time a compute-only loop repeatedly and return its normalized variance.
pub fn instruction_jitter(clock: &dyn TimeSource, config: &ProbeConfig) -> u32 {
    let count = config.jitter_samples.max(MIN_JITTER_SAMPLES);
    let mut samples = Vec::with_capacity(count);

    for _ in 0..count {
        let start = clock.now();
        black_box(spin(config.jitter_iterations));
        samples.push(clock.now().saturating_sub(start));
    }

    let metric = normalized_variance(&samples);
    tracing::debug!(samples = count, metric, "jitter probe");
    metric
}

/// `(variance * SCALE) / (mean^2 / SCALE)` using integer mean and population
/// variance, saturating at `u32::MAX`.
///
/// Returns 0 when there are no samples or when the mean is too small for the
/// scaled denominator to be non-zero.
#[must_use]
pub fn normalized_variance(samples: &[Ticks]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let n = samples.len() as u128;
    let mean = samples.iter().map(|&s| u128::from(s)).sum::<u128>() / n;

    let denominator = mean * mean / JITTER_SCALE;
    if denominator == 0 {
        return 0;
    }

    let sum_sq = samples.iter().fold(0u128, |acc, &s| {
        let diff = u128::from(s).abs_diff(mean);
        acc.saturating_add(diff * diff)
    });
    let variance = sum_sq / n;

    let metric = match variance.checked_mul(JITTER_SCALE) {
        Some(scaled) => scaled / denominator,
        // Samples near u64::MAX: divide first, losing precision below SCALE.
        None => (variance / denominator).saturating_mul(JITTER_SCALE),
    };
    u32::try_from(metric).unwrap_or(u32::MAX)
}

/// Register-only arithmetic; no memory traffic.
fn spin(iterations: u32) -> u64 {
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in 0..iterations {
        acc = black_box(acc.rotate_left(5) ^ u64::from(i)).wrapping_mul(0x0000_0100_0000_01B3);
    }
    acc
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_normalized_variance_total_on_any_pair(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(normalized_variance(&[a, b]), normalized_variance(&[b, a]));
        }

        #[test]
        fn prop_normalized_variance_never_panics(samples in prop::collection::vec(any::<u64>(), 0..64)) {
            let metric = normalized_variance(&samples);
            if samples.windows(2).all(|w| w[0] == w[1]) {
                prop_assert_eq!(metric, 0);
            }
        }
    }
}
