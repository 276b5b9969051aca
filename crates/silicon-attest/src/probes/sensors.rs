//! Thermal and hardware-identifier probes.
//!
//! Platform specifics sit behind [`SensorSource`]. [`HostSensors`] reads the
//! usual OS interfaces; tests and alternative platforms provide their own.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Serial reported when no hardware identifier can be found.
pub const UNKNOWN_SERIAL: &str = "unknown";

/// Values firmware vendors leave in identifier fields instead of a real serial.
const PLACEHOLDER_SERIALS: &[&str] = &[
    "none",
    "to be filled",
    "to be filled by o.e.m.",
    "default string",
    "not specified",
    "system serial number",
    "0",
    "00000000-0000-0000-0000-000000000000",
];

/// Source of platform sensor readings.
pub trait SensorSource: Send + Sync {
    /// Current temperature in whole degrees Celsius, if a sensor is readable.
    fn thermal_celsius(&self) -> Option<i32>;

    /// A platform hardware identifier, if one is readable.
    fn hardware_serial(&self) -> Option<String>;
}

/// Thermal probe: `None` means unavailable.
pub fn thermal_reading(sensors: &dyn SensorSource) -> Option<i32> {
    let reading = sensors.thermal_celsius();
    match reading {
        Some(celsius) => tracing::debug!(celsius, "thermal probe"),
        None => tracing::warn!("thermal sensor unavailable"),
    }
    reading
}

/// Serial probe: falls back to [`UNKNOWN_SERIAL`].
pub fn hardware_serial(sensors: &dyn SensorSource) -> String {
    match sensors.hardware_serial().and_then(|s| clean_serial(&s)) {
        Some(serial) => {
            tracing::debug!(len = serial.len(), "serial probe");
            serial
        }
        None => {
            tracing::warn!("hardware serial unavailable");
            UNKNOWN_SERIAL.to_string()
        }
    }
}

/// Trim NULs and whitespace and reject firmware placeholders.
pub(crate) fn clean_serial(raw: &str) -> Option<String> {
    let serial = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if serial.is_empty() {
        return None;
    }
    let lower = serial.to_ascii_lowercase();
    if PLACEHOLDER_SERIALS.contains(&lower.as_str()) {
        return None;
    }
    Some(serial.to_string())
}

/// Parse a sysfs `thermal_zone*/temp` value, which is always millidegrees.
pub(crate) fn parse_millidegrees(raw: &str) -> Option<i32> {
    let milli: i64 = raw.trim().parse().ok()?;
    i32::try_from((milli as f64 / 1000.0).round() as i64).ok()
}

/// Parse `sysctl` output that may be in millidegrees (`45000`), plain degrees
/// (`45`) or carry a unit suffix (`45.0C`, `45.00 degC`).
pub(crate) fn parse_celsius(raw: &str) -> Option<i32> {
    let numeric: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '.'))
        .collect();
    let value: f64 = numeric.parse().ok()?;
    let celsius = if value.abs() >= 1000.0 {
        value / 1000.0
    } else {
        value
    };
    Some(celsius.round() as i32)
}

/// Sensors read from the running operating system.
#[derive(Debug, Clone)]
pub struct HostSensors {
    root: PathBuf,
    run_commands: bool,
}

impl Default for HostSensors {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            run_commands: true,
        }
    }
}

impl HostSensors {
    /// Sensors rooted at the real filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read sysfs/procfs files below `root` instead of `/` and never spawn
    /// helper commands. Used for tests against a fake filesystem.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_commands: false,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn sysfs_thermal(&self) -> Option<i32> {
        let dir = self.path("sys/class/thermal");
        let mut zones: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("thermal_zone"))
            .map(|entry| entry.path())
            .collect();
        zones.sort();

        zones
            .iter()
            .filter_map(|zone| fs::read_to_string(zone.join("temp")).ok())
            .find_map(|raw| parse_millidegrees(&raw))
    }

    fn file_serial(&self) -> Option<String> {
        const SERIAL_FILES: &[&str] = &[
            "sys/class/dmi/id/product_serial",
            "sys/class/dmi/id/product_uuid",
            "sys/class/dmi/id/board_serial",
            "proc/device-tree/serial-number",
        ];

        SERIAL_FILES
            .iter()
            .filter_map(|relative| read_lossy(&self.path(relative)))
            .find_map(|raw| clean_serial(&raw))
    }

    fn command_thermal(&self) -> Option<i32> {
        if !self.run_commands || !cfg!(any(target_os = "freebsd", target_os = "openbsd")) {
            return None;
        }
        ["hw.acpi.thermal.tz0.temperature", "hw.sensors.cpu0.temp0"]
            .iter()
            .filter_map(|key| command_output("sysctl", &["-n", key]))
            .find_map(|out| parse_celsius(&out))
    }

    fn command_serial(&self) -> Option<String> {
        if !self.run_commands {
            return None;
        }
        if cfg!(target_os = "macos") {
            let out = command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
            ["IOPlatformSerialNumber", "IOPlatformUUID"]
                .iter()
                .find_map(|key| ioreg_value(&out, key))
        } else if cfg!(target_os = "windows") {
            let out = command_output("wmic", &["bios", "get", "serialnumber"])?;
            out.lines()
                .map(str::trim)
                .filter(|line| !line.eq_ignore_ascii_case("SerialNumber"))
                .find_map(clean_serial)
        } else {
            None
        }
    }
}

impl SensorSource for HostSensors {
    fn thermal_celsius(&self) -> Option<i32> {
        self.sysfs_thermal().or_else(|| self.command_thermal())
    }

    fn hardware_serial(&self) -> Option<String> {
        self.file_serial().or_else(|| self.command_serial())
    }
}

fn read_lossy(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract `"key" = "value"` from ioreg output.
fn ioreg_value(output: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    output
        .lines()
        .filter(|line| line.contains(&needle))
        .filter_map(|line| line.split_once('='))
        .find_map(|(_, value)| clean_serial(value.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    struct FixedSensors {
        thermal: Option<i32>,
        serial: Option<&'static str>,
    }

    impl SensorSource for FixedSensors {
        fn thermal_celsius(&self) -> Option<i32> {
            self.thermal
        }

        fn hardware_serial(&self) -> Option<String> {
            self.serial.map(str::to_string)
        }
    }

    #[test_case("45000\n" => Some(45) ; "millidegrees")]
    #[test_case("45" => Some(45) ; "degrees")]
    #[test_case("45.6C" => Some(46) ; "unit suffix")]
    #[test_case("38.00 degC" => Some(38) ; "bsd sensors")]
    #[test_case("-5000" => Some(-5) ; "negative millidegrees")]
    #[test_case("n/a" => None ; "garbage")]
    #[test_case("" => None ; "empty")]
    fn test_parse_celsius(raw: &str) -> Option<i32> {
        parse_celsius(raw)
    }

    #[test_case("45000\n" => Some(45) ; "typical zone")]
    #[test_case("500" => Some(1) ; "half a degree")]
    #[test_case("-5000" => Some(-5) ; "below zero")]
    #[test_case("45.0" => None ; "not an integer")]
    #[test_case("" => None ; "empty")]
    fn test_parse_millidegrees(raw: &str) -> Option<i32> {
        parse_millidegrees(raw)
    }

    #[test_case("C02XK1ABJG5H\n" => Some("C02XK1ABJG5H".to_string()) ; "trims newline")]
    #[test_case("SER123\0\0" => Some("SER123".to_string()) ; "trims nul")]
    #[test_case("To Be Filled By O.E.M." => None ; "oem placeholder")]
    #[test_case("None" => None ; "none placeholder")]
    #[test_case("   " => None ; "blank")]
    fn test_clean_serial(raw: &str) -> Option<String> {
        clean_serial(raw)
    }

    #[test]
    fn test_serial_probe_falls_back_to_unknown() {
        let sensors = FixedSensors {
            thermal: None,
            serial: Some("Default string"),
        };
        assert_eq!(hardware_serial(&sensors), UNKNOWN_SERIAL);
    }

    #[test]
    fn test_thermal_probe_passes_reading_through() {
        let sensors = FixedSensors {
            thermal: Some(41),
            serial: None,
        };
        assert_eq!(thermal_reading(&sensors), Some(41));
    }

    #[test]
    fn test_host_sensors_read_fake_sysfs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let zone = dir.path().join("sys/class/thermal/thermal_zone0");
        fs::create_dir_all(&zone).expect("mkdir");
        fs::write(zone.join("temp"), "52000\n").expect("write temp");
        let dmi = dir.path().join("sys/class/dmi/id");
        fs::create_dir_all(&dmi).expect("mkdir");
        fs::write(dmi.join("product_serial"), "To be filled by O.E.M.\n").expect("write");
        fs::write(dmi.join("product_uuid"), "4C4C4544-0042-3510-8052-B4C04F563132\n")
            .expect("write");

        let sensors = HostSensors::with_root(dir.path());

        assert_eq!(sensors.thermal_celsius(), Some(52));
        assert_eq!(
            sensors.hardware_serial().as_deref(),
            Some("4C4C4544-0042-3510-8052-B4C04F563132")
        );
    }

    #[test]
    fn test_host_sensors_small_zone_value_is_millidegrees() {
        let dir = tempfile::tempdir().expect("tempdir");
        let zone = dir.path().join("sys/class/thermal/thermal_zone0");
        fs::create_dir_all(&zone).expect("mkdir");
        fs::write(zone.join("temp"), "500\n").expect("write temp");

        let sensors = HostSensors::with_root(dir.path());

        assert_eq!(sensors.thermal_celsius(), Some(1));
    }

    #[test]
    fn test_host_sensors_empty_root_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sensors = HostSensors::with_root(dir.path());

        assert_eq!(thermal_reading(&sensors), None);
        assert_eq!(hardware_serial(&sensors), UNKNOWN_SERIAL);
    }

    #[test]
    fn test_ioreg_value_parsing() {
        let out = r#"
  | "IOPlatformUUID" = "564D1F2A-0000-0000-0000-1234567890AB"
  | "IOPlatformSerialNumber" = "C02ABC123XYZ"
"#;
        assert_eq!(
            ioreg_value(out, "IOPlatformSerialNumber").as_deref(),
            Some("C02ABC123XYZ")
        );
        assert_eq!(ioreg_value(out, "missing"), None);
    }
}
