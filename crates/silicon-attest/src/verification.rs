//! Response validation.
//!
//! Scoring starts at 100 and applies deductions in a fixed order:
//!
//! 1. timing envelope
//! 2. natural jitter
//! 3. cache L2/L1 ratio
//! 4. thermal sensor
//! 5. hardware serial
//!
//! The message of the first deduction becomes the failure reason. Later
//! deductions still lower the score but never replace the reason.

use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::error::AttestationError;
use crate::execution::Response;
use crate::probes::UNKNOWN_SERIAL;

/// Starting confidence.
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Thresholds and deduction weights.
///
/// These are heuristics, not derived values; the defaults reproduce the
/// reference tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Minimum confidence for a valid result.
    pub pass_threshold: f64,
    /// Deduction when the response finished under the envelope.
    pub too_fast_penalty: f64,
    /// Deduction when the response finished over the envelope.
    pub too_slow_penalty: f64,
    /// Jitter metric below which timing is considered synthetic.
    pub min_jitter_variance: u32,
    /// Deduction for synthetic-looking jitter.
    pub low_jitter_penalty: f64,
    /// Lowest plausible L2/L1 ratio.
    pub cache_ratio_min: f64,
    /// Highest plausible L2/L1 ratio.
    pub cache_ratio_max: f64,
    /// Deduction for an implausible cache ratio.
    pub cache_ratio_penalty: f64,
    /// Lowest plausible temperature in Celsius.
    pub thermal_min_celsius: i32,
    /// Highest plausible temperature in Celsius.
    pub thermal_max_celsius: i32,
    /// Deduction when no thermal reading is available.
    pub thermal_absent_penalty: f64,
    /// Deduction for a reading outside the plausible range.
    pub thermal_implausible_penalty: f64,
    /// Shortest acceptable hardware serial.
    pub min_serial_len: usize,
    /// Deduction for a missing or implausible serial.
    pub serial_penalty: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: 50.0,
            too_fast_penalty: 30.0,
            too_slow_penalty: 20.0,
            min_jitter_variance: 5,
            low_jitter_penalty: 40.0,
            cache_ratio_min: 1.5,
            cache_ratio_max: 20.0,
            cache_ratio_penalty: 25.0,
            thermal_min_celsius: 10,
            thermal_max_celsius: 100,
            thermal_absent_penalty: 15.0,
            thermal_implausible_penalty: 10.0,
            min_serial_len: 5,
            serial_penalty: 20.0,
        }
    }
}

impl ValidationPolicy {
    /// Reject policies that cannot produce a meaningful score.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidPolicy` naming the offending field.
    pub fn validate(&self) -> Result<(), AttestationError> {
        let fail = |msg: &str| Err(AttestationError::InvalidPolicy(msg.to_string()));

        if !(0.0..=MAX_CONFIDENCE).contains(&self.pass_threshold) {
            return fail("pass_threshold must be within [0, 100]");
        }
        let penalties = [
            self.too_fast_penalty,
            self.too_slow_penalty,
            self.low_jitter_penalty,
            self.cache_ratio_penalty,
            self.thermal_absent_penalty,
            self.thermal_implausible_penalty,
            self.serial_penalty,
        ];
        if penalties.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return fail("penalties must be finite and non-negative");
        }
        if !(self.cache_ratio_min.is_finite() && self.cache_ratio_max.is_finite())
            || self.cache_ratio_min > self.cache_ratio_max
        {
            return fail("cache_ratio_min must not exceed cache_ratio_max");
        }
        if self.thermal_min_celsius > self.thermal_max_celsius {
            return fail("thermal_min_celsius must not exceed thermal_max_celsius");
        }
        Ok(())
    }
}

/// Why confidence was reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionKind {
    /// Finished under the timing envelope.
    TooFast,
    /// Finished over the timing envelope.
    TooSlow,
    /// Jitter below the natural threshold.
    LowJitter,
    /// L2/L1 ratio outside the plausible band.
    CacheRatio,
    /// No thermal reading.
    ThermalAbsent,
    /// Thermal reading outside the plausible range.
    ThermalImplausible,
    /// Missing or implausible hardware serial.
    InvalidSerial,
}

/// One applied deduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deduction {
    /// Category.
    pub kind: DeductionKind,
    /// Points removed.
    pub amount: f64,
    /// Human-readable explanation.
    pub message: String,
}

/// Verdict for one (challenge, response) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `confidence_score >= pass_threshold`.
    pub valid: bool,
    /// Total ticks within the challenge envelope.
    pub timing_in_range: bool,
    /// Jitter at or above the natural threshold.
    pub jitter_natural: bool,
    /// Hardware serial looked genuine.
    pub hardware_match: bool,
    /// Plausible thermal reading present.
    pub thermal_present: bool,
    /// Remaining confidence in `[0, 100]`.
    pub confidence_score: f64,
    /// Message of the first deduction, empty if none.
    pub failure_reason: String,
    /// Measured L2/L1 ratio, when both timings were positive.
    pub cache_ratio: Option<f64>,
    /// Every deduction in evaluation order.
    pub deductions: Vec<Deduction>,
}

/// Running score with first-reason-wins bookkeeping.
struct Scorecard {
    score: f64,
    reason: String,
    deductions: Vec<Deduction>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            score: MAX_CONFIDENCE,
            reason: String::new(),
            deductions: Vec::new(),
        }
    }

    fn deduct(&mut self, kind: DeductionKind, amount: f64, message: String) {
        self.score = (self.score - amount).max(0.0);
        if self.reason.is_empty() {
            self.reason.clone_from(&message);
        }
        tracing::debug!(?kind, amount, score = self.score, "deduction");
        self.deductions.push(Deduction {
            kind,
            amount,
            message,
        });
    }
}

/// Scores responses against a [`ValidationPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: ValidationPolicy,
}

impl Validator {
    /// Validator with a custom policy.
    #[must_use]
    pub const fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Score a response. Pure: the same inputs always give the same result.
    #[must_use]
    pub fn validate(&self, challenge: &Challenge, response: &Response) -> ValidationResult {
        let policy = &self.policy;
        let mut card = Scorecard::new();

        // 1. Timing envelope.
        let ticks = response.timing_ticks;
        let timing_in_range = if ticks < u64::from(challenge.expected_min_ticks()) {
            card.deduct(
                DeductionKind::TooFast,
                policy.too_fast_penalty,
                format!(
                    "response too fast ({ticks} < {} ticks) - possible emulator speed hack",
                    challenge.expected_min_ticks()
                ),
            );
            false
        } else if ticks > u64::from(challenge.expected_max_ticks()) {
            card.deduct(
                DeductionKind::TooSlow,
                policy.too_slow_penalty,
                format!(
                    "response too slow ({ticks} > {} ticks) - possible slow emulator",
                    challenge.expected_max_ticks()
                ),
            );
            false
        } else {
            true
        };

        // 2. Natural jitter.
        let jitter_natural = response.jitter_variance >= policy.min_jitter_variance;
        if !jitter_natural {
            card.deduct(
                DeductionKind::LowJitter,
                policy.low_jitter_penalty,
                format!(
                    "timing too consistent (jitter={}) - emulator detected",
                    response.jitter_variance
                ),
            );
        }

        // 3. Cache ratio, only when both tiers were measured.
        let cache_ratio = response.cache_ratio();
        if let Some(ratio) = cache_ratio {
            if ratio < policy.cache_ratio_min || ratio > policy.cache_ratio_max {
                card.deduct(
                    DeductionKind::CacheRatio,
                    policy.cache_ratio_penalty,
                    format!("invalid cache timing ratio ({ratio:.2}) - emulated cache"),
                );
            }
        }

        // 4. Thermal sensor.
        let thermal_present = match response.thermal_reading {
            None => {
                card.deduct(
                    DeductionKind::ThermalAbsent,
                    policy.thermal_absent_penalty,
                    "thermal sensor unavailable".to_string(),
                );
                false
            }
            Some(celsius) if celsius < 0 => {
                card.deduct(
                    DeductionKind::ThermalAbsent,
                    policy.thermal_absent_penalty,
                    format!("thermal sensor unavailable (reading {celsius})"),
                );
                false
            }
            Some(celsius)
                if celsius < policy.thermal_min_celsius
                    || celsius > policy.thermal_max_celsius =>
            {
                card.deduct(
                    DeductionKind::ThermalImplausible,
                    policy.thermal_implausible_penalty,
                    format!("implausible thermal reading ({celsius} C)"),
                );
                false
            }
            Some(_) => true,
        };

        // 5. Hardware serial.
        let serial = response.hardware_serial.as_str();
        let hardware_match = !serial.eq_ignore_ascii_case(UNKNOWN_SERIAL)
            && serial.chars().count() >= policy.min_serial_len;
        if !hardware_match {
            card.deduct(
                DeductionKind::InvalidSerial,
                policy.serial_penalty,
                "missing or invalid hardware serial - generic VM".to_string(),
            );
        }

        ValidationResult {
            valid: card.score >= policy.pass_threshold,
            timing_in_range,
            jitter_natural,
            hardware_match,
            thermal_present,
            confidence_score: card.score,
            failure_reason: card.reason,
            cache_ratio,
            deductions: card.deductions,
        }
    }
}

/// Validate with the default policy.
#[must_use]
pub fn validate(challenge: &Challenge, response: &Response) -> ValidationResult {
    Validator::default().validate(challenge, response)
}
