//! Platform capability table.

use serde::{Deserialize, Serialize};

use crate::probes::{SensorSource, CACHE_LINE_BYTES};
use crate::timesource::{HostClock, TimeSource};

/// Which measurement sources this host offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Target architecture.
    pub arch: String,
    /// Target operating system.
    pub os: String,
    /// Name of the selected time source.
    pub clock: String,
    /// Whether ticks come from a CPU counter register.
    pub cycle_accurate: bool,
    /// Clock ticks per second.
    pub clock_hz: Option<u64>,
    /// Whether a thermal sensor answered.
    pub thermal_sensor: bool,
    /// Whether a hardware identifier was found.
    pub hardware_serial: bool,
    /// Cache line size used as the probe stride.
    pub cache_line_bytes: usize,
}

impl Capabilities {
    /// Inspect the host.
    pub fn detect(clock: &HostClock, sensors: &dyn SensorSource) -> Self {
        Self {
            arch: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
            clock: clock.name().to_string(),
            cycle_accurate: clock.is_cycle_accurate(),
            clock_hz: clock.frequency_hz(),
            thermal_sensor: sensors.thermal_celsius().is_some(),
            hardware_serial: sensors.hardware_serial().is_some(),
            cache_line_bytes: CACHE_LINE_BYTES,
        }
    }
}
