//! Output formatting for CLI commands.
//!
//! Supports table (human-readable report) and JSON output formats.

use std::io::Write;

use serde::Serialize;
use silicon_attest::challenge::REFERENCE_TICK_HZ;
use silicon_attest::{
    AttestConfig, AttestationRound, Capabilities, ChallengeType, DeductionKind, ValidationResult,
};
use uuid::Uuid;

use crate::cli::Format;
use crate::error::CliError;

const BANNER_WIDTH: usize = 70;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

// =============================================================================
// Attestation rounds
// =============================================================================

impl TableDisplay for AttestationRound {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let challenge = &self.challenge;
        let response = &self.response;

        banner(writer, &format!("{} CHALLENGE RESPONSE", upper(challenge.challenge_type())))?;
        writeln!(writer, "  Challenge:          {}", challenge.id())?;
        writeln!(
            writer,
            "  Envelope:           {}..={} ticks",
            challenge.expected_min_ticks(),
            challenge.expected_max_ticks()
        )?;
        writeln!(writer, "  Clock:              {}", response.clock)?;
        let mutation = challenge.mutation();
        writeln!(
            writer,
            "  Mutation:           stride x{}, offset {}, depth {}%",
            mutation.cache_stride_lines, mutation.memory_offset, mutation.jitter_depth_percent
        )?;
        writeln!(writer)?;
        writeln!(writer, "  Timing Analysis:")?;
        writeln!(writer, "    Total ticks:      {}", response.timing_ticks)?;
        writeln!(writer, "    Timebase value:   {}", response.timebase_value)?;
        writeln!(
            writer,
            "    Jitter variance:  {} ({:.2}%)",
            response.jitter_variance,
            f64::from(response.jitter_variance) / 10.0
        )?;
        writeln!(writer)?;
        writeln!(writer, "  Cache Timing:")?;
        writeln!(writer, "    L1 access time:   {} ticks", response.cache_l1_time)?;
        writeln!(writer, "    L2 access time:   {} ticks", response.cache_l2_time)?;
        if let Some(ratio) = response.cache_ratio() {
            writeln!(writer, "    L2/L1 ratio:      {ratio:.2}x")?;
        }
        writeln!(writer)?;
        writeln!(writer, "  Memory:")?;
        writeln!(writer, "    Random access:    {} ticks", response.memory_time)?;
        writeln!(writer)?;
        writeln!(writer, "  Hardware:")?;
        writeln!(writer, "    Serial:           {}", response.hardware_serial)?;
        match response.thermal_reading {
            Some(celsius) => writeln!(writer, "    Thermal:          {celsius} C")?,
            None => writeln!(writer, "    Thermal:          unavailable")?,
        }
        writeln!(writer)?;
        writeln!(writer, "  Response Hash:")?;
        let hash = response.hash_hex();
        let (head, tail) = hash.split_at(hash.len() / 2);
        writeln!(writer, "    {head}")?;
        writeln!(writer, "    {tail}")?;
        writeln!(writer)?;

        self.result.write_table(writer)
    }
}

impl TableDisplay for ValidationResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let cache_ok = !self
            .deductions
            .iter()
            .any(|d| d.kind == DeductionKind::CacheRatio);

        banner(writer, "VALIDATION RESULT")?;
        writeln!(writer, "  Checks:")?;
        writeln!(writer, "    Timing in range:  {}", check(self.timing_in_range))?;
        writeln!(writer, "    Natural jitter:   {}", check(self.jitter_natural))?;
        match self.cache_ratio {
            Some(_) => writeln!(writer, "    Cache ratio:      {}", check(cache_ok))?,
            None => writeln!(writer, "    Cache ratio:      - SKIP")?,
        }
        writeln!(writer, "    Hardware serial:  {}", check(self.hardware_match))?;
        writeln!(writer, "    Thermal sensor:   {}", check(self.thermal_present))?;
        writeln!(writer)?;
        writeln!(writer, "  Confidence Score: {:.1}%", self.confidence_score)?;

        if !self.deductions.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "  Deductions:")?;
            for deduction in &self.deductions {
                writeln!(writer, "    -{:>5.1}  {}", deduction.amount, deduction.message)?;
            }
        }

        writeln!(writer)?;
        if self.valid {
            writeln!(writer, "  ✓ HARDWARE VERIFIED - NOT AN EMULATOR")?;
        } else {
            writeln!(writer, "  ✗ VALIDATION FAILED - POSSIBLE EMULATOR")?;
            writeln!(writer, "  Failure: {}", self.failure_reason)?;
        }
        Ok(())
    }
}

/// Results of one `run` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Every round in execution order.
    pub rounds: Vec<AttestationRound>,
    /// Rounds that validated.
    pub passed: usize,
    /// Rounds that did not.
    pub failed: usize,
}

impl RunSummary {
    /// Summarize completed rounds.
    #[must_use]
    pub fn new(rounds: Vec<AttestationRound>) -> Self {
        let passed = rounds.iter().filter(|r| r.result.valid).count();
        let failed = rounds.len() - passed;
        Self {
            rounds,
            passed,
            failed,
        }
    }

    /// True when at least one round ran and none failed.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        !self.rounds.is_empty() && self.failed == 0
    }
}

impl TableDisplay for RunSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for (i, round) in self.rounds.iter().enumerate() {
            if i > 0 {
                writeln!(writer)?;
            }
            round.write_table(writer)?;
        }
        if self.rounds.len() > 1 {
            let mean = self
                .rounds
                .iter()
                .map(|r| r.result.confidence_score)
                .sum::<f64>()
                / self.rounds.len() as f64;
            writeln!(writer)?;
            writeln!(writer, "{}", "─".repeat(BANNER_WIDTH))?;
            writeln!(
                writer,
                "Rounds: {}  Passed: {}  Failed: {}  Mean score: {mean:.1}%",
                self.rounds.len(),
                self.passed,
                self.failed
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Offline validation
// =============================================================================

/// Verdict on a saved challenge and response.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    /// Id of the challenge that was validated against.
    pub challenge_id: Uuid,
    /// Type of that challenge.
    pub challenge_type: ChallengeType,
    /// The response names this challenge.
    pub challenge_matches: bool,
    /// The response's mixing hash is consistent with its fields.
    pub hash_matches: bool,
    /// Heuristic scoring result.
    pub result: ValidationResult,
}

impl Verdict {
    /// Accepted only when the response belongs to the challenge, is internally
    /// consistent, and scores as valid.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.challenge_matches && self.hash_matches && self.result.valid
    }
}

impl TableDisplay for Verdict {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Challenge:        {} ({})", self.challenge_id, self.challenge_type)?;
        writeln!(writer, "Challenge match:  {}", check(self.challenge_matches))?;
        writeln!(writer, "Hash consistent:  {}", check(self.hash_matches))?;
        writeln!(writer)?;
        self.result.write_table(writer)
    }
}

// =============================================================================
// Host inspection
// =============================================================================

impl TableDisplay for Capabilities {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Platform Capabilities")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Architecture:     {}", self.arch)?;
        writeln!(writer, "OS:               {}", self.os)?;
        writeln!(writer, "Clock:            {}", self.clock)?;
        writeln!(writer, "Cycle accurate:   {}", yes_no(self.cycle_accurate))?;
        match self.clock_hz {
            Some(hz) => writeln!(writer, "Clock rate:       {:.3} MHz", hz as f64 / 1e6)?,
            None => writeln!(writer, "Clock rate:       unknown")?,
        }
        writeln!(writer, "Thermal sensor:   {}", yes_no(self.thermal_sensor))?;
        writeln!(writer, "Hardware serial:  {}", yes_no(self.hardware_serial))?;
        writeln!(writer, "Cache line:       {} bytes", self.cache_line_bytes)?;
        Ok(())
    }
}

impl TableDisplay for AttestConfig {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let probes = &self.probes;
        let policy = &self.policy;

        writeln!(writer, "Probes")?;
        writeln!(writer, "  L1 buffer:        {} bytes", probes.l1_buffer_bytes)?;
        writeln!(writer, "  L2 buffer:        {} bytes", probes.l2_buffer_bytes)?;
        writeln!(writer, "  Stride:           {} bytes", probes.stride_bytes)?;
        writeln!(writer, "  Memory buffer:    {} bytes", probes.memory_buffer_bytes)?;
        writeln!(
            writer,
            "  Memory reads:     {} (prime {})",
            probes.memory_reads, probes.memory_prime
        )?;
        writeln!(
            writer,
            "  Jitter:           {} samples x {} iterations",
            probes.jitter_samples, probes.jitter_iterations
        )?;
        writeln!(writer)?;

        writeln!(
            writer,
            "Envelopes (ticks at {:.1} MHz, rescaled per clock)",
            REFERENCE_TICK_HZ as f64 / 1e6
        )?;
        for kind in ChallengeType::ALL {
            let envelope = self.envelopes.get(kind);
            writeln!(
                writer,
                "  {:<10}        {}..={}",
                kind.as_str(),
                envelope.min_ticks(),
                envelope.max_ticks()
            )?;
        }
        writeln!(writer)?;

        writeln!(writer, "Policy")?;
        writeln!(writer, "  Pass threshold:   {:.1}", policy.pass_threshold)?;
        writeln!(
            writer,
            "  Timing:           -{} too fast, -{} too slow",
            policy.too_fast_penalty, policy.too_slow_penalty
        )?;
        writeln!(
            writer,
            "  Jitter:           -{} below {}",
            policy.low_jitter_penalty, policy.min_jitter_variance
        )?;
        writeln!(
            writer,
            "  Cache ratio:      -{} outside {}..={}",
            policy.cache_ratio_penalty, policy.cache_ratio_min, policy.cache_ratio_max
        )?;
        writeln!(
            writer,
            "  Thermal:          -{} absent, -{} outside {}..={} C",
            policy.thermal_absent_penalty,
            policy.thermal_implausible_penalty,
            policy.thermal_min_celsius,
            policy.thermal_max_celsius
        )?;
        writeln!(
            writer,
            "  Serial:           -{} shorter than {}",
            policy.serial_penalty, policy.min_serial_len
        )?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn banner<W: Write>(writer: &mut W, title: &str) -> Result<(), CliError> {
    writeln!(writer, "╔{}╗", "═".repeat(BANNER_WIDTH))?;
    writeln!(writer, "║ {title:^width$} ║", width = BANNER_WIDTH - 2)?;
    writeln!(writer, "╚{}╝", "═".repeat(BANNER_WIDTH))?;
    writeln!(writer)?;
    Ok(())
}

fn upper(kind: ChallengeType) -> String {
    kind.as_str().to_ascii_uppercase()
}

const fn check(pass: bool) -> &'static str {
    if pass { "✓ PASS" } else { "✗ FAIL" }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
