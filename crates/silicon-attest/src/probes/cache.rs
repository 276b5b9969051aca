//! Cache-tier latency probe.
//!
//! Times strided reads of a small, primed buffer twice: once while it is hot in
//! the first cache level, and again after sweeping a larger buffer has evicted
//! it. Real two-level hierarchies make the second pass several times slower;
//! emulated caches usually do not.

use std::hint::black_box;

use serde::{Deserialize, Serialize};

use super::{ProbeConfig, Scratch};
use crate::timesource::{Ticks, TimeSource};

/// Timings from one cache-tier measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheTiming {
    /// Ticks for the hot re-read.
    pub l1: Ticks,
    /// Ticks for the re-read after eviction.
    pub l2: Ticks,
}

impl CacheTiming {
    /// Both timings are zero when scratch memory was unavailable.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.l1 > 0 || self.l2 > 0
    }

    /// L2/L1 ratio, if both timings are positive.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        (self.l1 > 0 && self.l2 > 0).then(|| self.l2 as f64 / self.l1 as f64)
    }
}

/// Measure hot versus evicted read latency with freshly allocated buffers.
///
/// Returns `CacheTiming::default()` (both zero) if either buffer cannot be
/// allocated.
pub fn cache_tiers(clock: &dyn TimeSource, config: &ProbeConfig) -> CacheTiming {
    cache_tiers_in(clock, config, &mut Scratch::cache(config))
}

/// Measure hot versus evicted read latency in pre-allocated buffers.
pub fn cache_tiers_in(
    clock: &dyn TimeSource,
    config: &ProbeConfig,
    scratch: &mut Scratch,
) -> CacheTiming {
    let stride = config.stride_bytes.max(1);
    let Some((small, large)) = scratch.cache_buffers() else {
        tracing::warn!(
            l1_bytes = config.l1_buffer_bytes,
            l2_bytes = config.l2_buffer_bytes,
            "cache probe scratch unavailable"
        );
        return CacheTiming::default();
    };

    touch(small, stride);

    let start = clock.now();
    black_box(strided_read(small, stride));
    let l1 = clock.now().saturating_sub(start);

    touch(large, stride);

    let start = clock.now();
    black_box(strided_read(small, stride));
    let l2 = clock.now().saturating_sub(start);

    let timing = CacheTiming { l1, l2 };
    tracing::debug!(l1, l2, ratio = ?timing.ratio(), stride, "cache probe");
    timing
}

fn touch(buf: &mut [u8], stride: usize) {
    for i in (0..buf.len()).step_by(stride) {
        buf[i] = i as u8;
    }
    black_box(buf);
}

fn strided_read(buf: &[u8], stride: usize) -> u8 {
    let buf = black_box(buf);
    buf.iter()
        .step_by(stride)
        .fold(0u8, |acc, &byte| acc ^ black_box(byte))
}
