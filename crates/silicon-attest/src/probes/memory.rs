//! Memory-pattern latency probe.

use std::hint::black_box;

use super::{ProbeConfig, Scratch};
use crate::timesource::{Ticks, TimeSource};

/// Time scattered reads across a freshly allocated buffer.
///
/// Returns 0 if the buffer cannot be allocated.
pub fn memory_pattern(clock: &dyn TimeSource, config: &ProbeConfig) -> Ticks {
    memory_pattern_in(clock, config, &Scratch::memory(config))
}

/// Time scattered reads across a pre-allocated buffer larger than every cache
/// level.
///
/// Offsets follow `(offset + i * prime) mod size`, which jumps far enough
/// between reads to defeat linear prefetchers. Each read also depends on the
/// previous byte, so the loop measures latency rather than throughput.
pub fn memory_pattern_in(clock: &dyn TimeSource, config: &ProbeConfig, scratch: &Scratch) -> Ticks {
    let Some(buffer) = scratch.memory_buffer() else {
        tracing::warn!(bytes = config.memory_buffer_bytes, "memory probe scratch unavailable");
        return 0;
    };
    let buffer = black_box(buffer);
    let size = buffer.len();

    let start = clock.now();
    let mut sink = 0u8;
    for i in 0..config.memory_reads {
        let offset = scatter_offset(i, config.memory_prime, config.memory_offset, size);
        sink ^= black_box(buffer[(offset + usize::from(sink)) % size]);
    }
    let elapsed = clock.now().saturating_sub(start);
    black_box(sink);

    tracing::debug!(ticks = elapsed, reads = config.memory_reads, "memory probe");
    elapsed
}

/// Offset of the `i`-th read.
pub(crate) const fn scatter_offset(i: usize, prime: usize, offset: usize, size: usize) -> usize {
    offset.wrapping_add(i.wrapping_mul(prime)) % size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timesource::{HostClock, SteppingClock};

    #[test]
    fn test_scatter_offsets_stay_in_bounds() {
        let size = 1024 * 1024;
        for i in 0..10_000 {
            assert!(scatter_offset(i, 7919, usize::MAX - 3, size) < size);
        }
    }

    #[test]
    fn test_scatter_offsets_are_not_linear() {
        let size = 16 * 1024 * 1024;
        assert_eq!(scatter_offset(0, 7919, 0, size), 0);
        assert_eq!(scatter_offset(1, 7919, 0, size), 7919);
        assert_eq!(scatter_offset(2, 7919, 0, size), 15_838);
    }

    #[test]
    fn test_scatter_offset_shifts_walk() {
        let size = 1024;
        assert_eq!(scatter_offset(0, 7919, 100, size), 100);
        assert_eq!(scatter_offset(1, 7919, 100, size), (100 + 7919) % size);
        assert_eq!(scatter_offset(0, 7919, size + 5, size), 5);
    }

    #[test]
    fn test_empty_scratch_returns_zero() {
        let ticks = memory_pattern_in(
            &SteppingClock::new(0, 1),
            &ProbeConfig::compact(),
            &Scratch::default(),
        );
        assert_eq!(ticks, 0);
    }

    #[test]
    fn test_stepping_clock_measures_one_step() {
        let ticks = memory_pattern(&SteppingClock::new(0, 500), &ProbeConfig::compact());
        assert_eq!(ticks, 500);
    }

    #[test]
    fn test_allocation_failure_returns_zero() {
        let config = ProbeConfig {
            memory_buffer_bytes: usize::MAX,
            ..ProbeConfig::compact()
        };
        assert_eq!(memory_pattern(&SteppingClock::new(0, 1), &config), 0);
    }

    #[test]
    fn test_host_clock_measures_positive_time() {
        let ticks = memory_pattern(&HostClock::detect(), &ProbeConfig::compact());
        assert!(ticks > 0);
    }
}
