//! Monotonic high-resolution time sources.
//!
//! | Platform | Source         | Unit           |
//! |----------|----------------|----------------|
//! | x86_64   | `rdtsc`        | TSC cycles     |
//! | aarch64  | `cntvct_el0`   | counter ticks  |
//! | other    | `Instant`      | nanoseconds    |
//!
//! Every host reading goes through [`Monotonic`], so a clock never appears to
//! run backwards inside one process even if the raw counter is not synchronized
//! across cores.
//!
//! Host clocks also report their frequency so timing windows written for one
//! counter rate can be rescaled to another. The x86_64 TSC rate is not
//! architecturally visible and is calibrated once against `Instant`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Raw tick count from a [`TimeSource`].
pub type Ticks = u64;

/// Nanosecond clock rate.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A monotonically non-decreasing tick counter.
pub trait TimeSource: Send + Sync {
    /// Read the current tick count.
    fn now(&self) -> Ticks;

    /// Short name of the underlying counter, for reports.
    fn name(&self) -> &'static str;

    /// Ticks per second, if the counter runs at a known rate.
    ///
    /// `None` means the ticks are abstract units, as with [`SteppingClock`].
    fn frequency_hz(&self) -> Option<u64> {
        None
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Ticks {
        (**self).now()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn frequency_hz(&self) -> Option<u64> {
        (**self).frequency_hz()
    }
}

// =============================================================================
// Cycle counter
// =============================================================================

/// Reads the CPU's free-running cycle/counter register.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCounter;

impl CycleCounter {
    /// Whether this build has a register-backed counter.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(any(target_arch = "x86_64", target_arch = "aarch64"))
    }
}

#[allow(unsafe_code)]
mod register {
    use super::Ticks;
    use std::sync::atomic::{compiler_fence, Ordering};

    #[cfg(target_arch = "x86_64")]
    #[inline]
    pub(super) fn read() -> Ticks {
        compiler_fence(Ordering::SeqCst);
        // SAFETY: RDTSC is unprivileged and present on every x86_64 CPU.
        let ticks = unsafe { core::arch::x86_64::_rdtsc() };
        compiler_fence(Ordering::SeqCst);
        ticks
    }

    #[cfg(target_arch = "aarch64")]
    #[inline]
    pub(super) fn read() -> Ticks {
        compiler_fence(Ordering::SeqCst);
        let ticks: u64;
        // SAFETY: CNTVCT_EL0 is readable from EL0 on all supported OSes.
        unsafe {
            core::arch::asm!(
                "isb",
                "mrs {}, cntvct_el0",
                out(reg) ticks,
                options(nostack, nomem),
            );
        }
        compiler_fence(Ordering::SeqCst);
        ticks
    }

    #[cfg(target_arch = "aarch64")]
    pub(super) fn frequency() -> Option<u64> {
        let hz: u64;
        // SAFETY: CNTFRQ_EL0 is readable wherever CNTVCT_EL0 is.
        unsafe {
            core::arch::asm!(
                "mrs {}, cntfrq_el0",
                out(reg) hz,
                options(nostack, nomem),
            );
        }
        (hz > 0).then_some(hz)
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub(super) fn frequency() -> Option<u64> {
        None
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[inline]
    pub(super) fn read() -> Ticks {
        super::process_nanos()
    }
}

const CALIBRATION_WINDOW: Duration = Duration::from_millis(5);

static CYCLE_HZ: Lazy<u64> = Lazy::new(|| {
    if !CycleCounter::is_supported() {
        return NANOS_PER_SECOND;
    }
    register::frequency().unwrap_or_else(|| calibrate(&CycleCounter, CALIBRATION_WINDOW))
});

/// Estimate a counter's rate by spinning against `Instant` for `window`.
pub(crate) fn calibrate(clock: &dyn TimeSource, window: Duration) -> u64 {
    let started = Instant::now();
    let first = clock.now();
    while started.elapsed() < window {
        std::hint::spin_loop();
    }
    let ticks = clock.now().saturating_sub(first);
    let nanos = started.elapsed().as_nanos().max(1);
    let hz = u128::from(ticks) * u128::from(NANOS_PER_SECOND) / nanos;
    u64::try_from(hz).unwrap_or(u64::MAX).max(1)
}

impl TimeSource for CycleCounter {
    fn now(&self) -> Ticks {
        register::read()
    }

    fn name(&self) -> &'static str {
        if cfg!(target_arch = "x86_64") {
            "rdtsc"
        } else if cfg!(target_arch = "aarch64") {
            "cntvct_el0"
        } else {
            "monotonic-ns"
        }
    }

    fn frequency_hz(&self) -> Option<u64> {
        Some(*CYCLE_HZ)
    }
}

// =============================================================================
// OS monotonic clock
// =============================================================================

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

fn process_nanos() -> Ticks {
    u64::try_from(PROCESS_START.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Nanoseconds since the first clock read in this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl TimeSource for MonotonicClock {
    fn now(&self) -> Ticks {
        process_nanos()
    }

    fn name(&self) -> &'static str {
        "monotonic-ns"
    }

    fn frequency_hz(&self) -> Option<u64> {
        Some(NANOS_PER_SECOND)
    }
}

// =============================================================================
// Split registers
// =============================================================================

/// A 64-bit counter exposed as two 32-bit halves.
///
/// The PowerPC timebase is the classic case: `mftbu` and `mftb` read the upper
/// and lower words separately, so a carry between the two reads tears the
/// value. Stable Rust has no `asm!` for PowerPC, so platforms with such a
/// register (or a memory-mapped 64-bit timer split across two 32-bit ports)
/// implement this trait themselves and wrap it in a [`SplitCounter`].
pub trait SplitRegister: Send + Sync {
    /// Read the upper 32 bits.
    fn read_high(&self) -> u32;
    /// Read the lower 32 bits.
    fn read_low(&self) -> u32;
}

/// Time source over a [`SplitRegister`] with a torn-read guard.
#[derive(Debug)]
pub struct SplitCounter<R> {
    register: R,
    name: &'static str,
    frequency_hz: Option<u64>,
}

impl<R: SplitRegister> SplitCounter<R> {
    /// Wrap a split register running at an unknown rate.
    pub const fn new(register: R, name: &'static str) -> Self {
        Self {
            register,
            name,
            frequency_hz: None,
        }
    }

    /// Declare the register's tick rate.
    #[must_use]
    pub const fn with_frequency(mut self, hz: u64) -> Self {
        self.frequency_hz = Some(hz);
        self
    }

    /// Read high, low, high; retry until both high reads agree so a carry from
    /// the low half between reads cannot produce a torn value.
    pub fn read(&self) -> Ticks {
        loop {
            let high = self.register.read_high();
            let low = self.register.read_low();
            if self.register.read_high() == high {
                return (u64::from(high) << 32) | u64::from(low);
            }
        }
    }
}

impl<R: SplitRegister> TimeSource for SplitCounter<R> {
    fn now(&self) -> Ticks {
        self.read()
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn frequency_hz(&self) -> Option<u64> {
        self.frequency_hz
    }
}

// =============================================================================
// Monotonic guard
// =============================================================================

/// Clamps an inner source so readings never decrease.
#[derive(Debug)]
pub struct Monotonic<C> {
    inner: C,
    last: AtomicU64,
}

impl<C: TimeSource> Monotonic<C> {
    /// Wrap a time source.
    pub const fn new(inner: C) -> Self {
        Self {
            inner,
            last: AtomicU64::new(0),
        }
    }

    /// The wrapped source.
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: TimeSource> TimeSource for Monotonic<C> {
    fn now(&self) -> Ticks {
        let raw = self.inner.now();
        let prev = self.last.fetch_max(raw, Ordering::AcqRel);
        prev.max(raw)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn frequency_hz(&self) -> Option<u64> {
        self.inner.frequency_hz()
    }
}

// =============================================================================
// Deterministic clock
// =============================================================================

/// Advances by a fixed step on every read.
///
/// Probes timed with this clock see perfectly uniform durations, which is what a
/// naive emulator looks like.
#[derive(Debug)]
pub struct SteppingClock {
    next: AtomicU64,
    step: u64,
}

impl SteppingClock {
    /// Start at `start`, advancing `step` ticks per read.
    #[must_use]
    pub const fn new(start: Ticks, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl TimeSource for SteppingClock {
    fn now(&self) -> Ticks {
        self.next.fetch_add(self.step, Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "stepping"
    }
}

// =============================================================================
// Host clock selection
// =============================================================================

/// Which host clock to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockPreference {
    /// Cycle counter when the build supports one, else the monotonic clock.
    #[default]
    Auto,
    /// Cycle counter; falls back to the monotonic clock if unsupported.
    Cycle,
    /// OS monotonic clock.
    Monotonic,
}

/// The best available clock on this host.
#[derive(Debug)]
pub enum HostClock {
    /// Register-backed counter.
    Cycle(Monotonic<CycleCounter>),
    /// OS monotonic clock.
    Monotonic(Monotonic<MonotonicClock>),
}

impl HostClock {
    /// Pick the highest-resolution clock available.
    #[must_use]
    pub fn detect() -> Self {
        Self::with_preference(ClockPreference::Auto)
    }

    /// Pick a clock honoring `preference` where the platform allows it.
    #[must_use]
    pub fn with_preference(preference: ClockPreference) -> Self {
        match preference {
            ClockPreference::Auto | ClockPreference::Cycle if CycleCounter::is_supported() => {
                Self::Cycle(Monotonic::new(CycleCounter))
            }
            ClockPreference::Cycle => {
                tracing::warn!("cycle counter unsupported on this target, using monotonic clock");
                Self::Monotonic(Monotonic::new(MonotonicClock))
            }
            _ => Self::Monotonic(Monotonic::new(MonotonicClock)),
        }
    }

    /// Whether ticks are CPU counter ticks rather than nanoseconds.
    #[must_use]
    pub const fn is_cycle_accurate(&self) -> bool {
        matches!(self, Self::Cycle(_)) && CycleCounter::is_supported()
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::detect()
    }
}

impl TimeSource for HostClock {
    fn now(&self) -> Ticks {
        match self {
            Self::Cycle(c) => c.now(),
            Self::Monotonic(c) => c.now(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Cycle(c) => c.name(),
            Self::Monotonic(c) => c.name(),
        }
    }

    fn frequency_hz(&self) -> Option<u64> {
        match self {
            Self::Cycle(c) => c.frequency_hz(),
            Self::Monotonic(c) => c.frequency_hz(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Split register that yields a scripted sequence of (high, low) reads.
    struct ScriptedRegister {
        highs: Mutex<Vec<u32>>,
        lows: Mutex<Vec<u32>>,
    }

    impl ScriptedRegister {
        fn new(mut highs: Vec<u32>, mut lows: Vec<u32>) -> Self {
            highs.reverse();
            lows.reverse();
            Self {
                highs: Mutex::new(highs),
                lows: Mutex::new(lows),
            }
        }
    }

    impl SplitRegister for ScriptedRegister {
        fn read_high(&self) -> u32 {
            self.highs.lock().expect("lock").pop().expect("scripted high")
        }

        fn read_low(&self) -> u32 {
            self.lows.lock().expect("lock").pop().expect("scripted low")
        }
    }

    /// Source that replays fixed readings, including backwards jumps.
    struct Replay(Mutex<Vec<Ticks>>);

    impl TimeSource for Replay {
        fn now(&self) -> Ticks {
            self.0.lock().expect("lock").remove(0)
        }

        fn name(&self) -> &'static str {
            "replay"
        }
    }

    #[test]
    fn test_split_counter_consistent_read() {
        let counter = SplitCounter::new(ScriptedRegister::new(vec![7, 7], vec![42]), "tb");
        assert_eq!(counter.now(), (7u64 << 32) | 42);
    }

    #[test]
    fn test_split_counter_retries_on_carry() {
        // Low half wraps between the first high read and the low read.
        let register = ScriptedRegister::new(vec![1, 2, 2, 2], vec![0xFFFF_FFFF, 5]);
        let counter = SplitCounter::new(register, "tb");

        assert_eq!(counter.now(), (2u64 << 32) | 5);
    }

    #[test]
    fn test_monotonic_never_goes_backward() {
        let clock = Monotonic::new(Replay(Mutex::new(vec![10, 50, 20, 60, 5])));
        let readings: Vec<_> = (0..5).map(|_| clock.now()).collect();

        assert_eq!(readings, vec![10, 50, 50, 60, 60]);
    }

    #[test]
    fn test_stepping_clock_advances_by_step() {
        let clock = SteppingClock::new(100, 7);
        assert_eq!(clock.now(), 100);
        assert_eq!(clock.now(), 107);
        assert_eq!(clock.now(), 114);
        assert_eq!(clock.name(), "stepping");
    }

    #[test]
    fn test_host_clock_is_non_decreasing() {
        let clock = HostClock::detect();
        let mut last = clock.now();
        for _ in 0..10_000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_monotonic_preference_selects_ns_clock() {
        let clock = HostClock::with_preference(ClockPreference::Monotonic);
        assert_eq!(clock.name(), "monotonic-ns");
        assert!(!clock.is_cycle_accurate());
        assert_eq!(clock.frequency_hz(), Some(NANOS_PER_SECOND));
    }

    #[test]
    fn test_host_clock_frequency_is_plausible() {
        let hz = HostClock::detect().frequency_hz().expect("host clocks have a rate");
        // Slowest generic timers run at 1 MHz; nothing counts faster than 100 GHz.
        assert!((1_000_000..100_000_000_000).contains(&hz), "hz={hz}");
    }

    #[test]
    fn test_calibrate_monotonic_clock_recovers_nanoseconds() {
        let hz = calibrate(&MonotonicClock, Duration::from_millis(2));
        let error = hz.abs_diff(NANOS_PER_SECOND);
        assert!(error < NANOS_PER_SECOND / 20, "hz={hz}");
    }

    #[test]
    fn test_split_counter_frequency() {
        let plain = SplitCounter::new(ScriptedRegister::new(vec![], vec![]), "tb");
        assert_eq!(plain.frequency_hz(), None);

        let timebase = plain.with_frequency(33_333_333);
        assert_eq!(timebase.frequency_hz(), Some(33_333_333));
        assert_eq!(Monotonic::new(timebase).frequency_hz(), Some(33_333_333));
    }

    #[test]
    fn test_stepping_clock_has_no_frequency() {
        assert_eq!(SteppingClock::new(0, 1).frequency_hz(), None);
    }

    #[test]
    fn test_clock_preference_serde() {
        let pref: ClockPreference = serde_json::from_str("\"cycle\"").expect("deserialize");
        assert_eq!(pref, ClockPreference::Cycle);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    struct Fixed(u32, u32);

    impl SplitRegister for Fixed {
        fn read_high(&self) -> u32 {
            self.0
        }

        fn read_low(&self) -> u32 {
            self.1
        }
    }

    proptest! {
        #[test]
        fn prop_split_counter_recombines_halves(high in any::<u32>(), low in any::<u32>()) {
            let counter = SplitCounter::new(Fixed(high, low), "fixed");
            prop_assert_eq!(counter.now() >> 32, u64::from(high));
            prop_assert_eq!(counter.now() & 0xFFFF_FFFF, u64::from(low));
        }

        #[test]
        fn prop_stepping_clock_strictly_increases(start in 0u64..1_000_000, step in 1u64..10_000) {
            let clock = SteppingClock::new(start, step);
            let a = clock.now();
            let b = clock.now();
            prop_assert_eq!(b - a, step);
        }
    }
}
