//! Synthetic spin telemetry generation.
//!
//! Produces a deterministic sun pulse train for a spinning probe, with:
//!
//! - a base spin period and a linear period drift
//! - Gaussian timing jitter on every observed pulse
//! - random single-pulse dropouts and removed telemetry gaps
//! - eclipse windows where pulses vanish and the true period stretches
//! - onboard spin-period samples at a fixed cadence
//!
//! The true pulse times are returned alongside so tests and the CLI can
//! measure model error directly.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::{OnboardSpinSample, SpinTelemetry, TimeRange};
use crate::error::{Result, SpinModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub seed: u64,
    pub start: f64,
    /// Length of the generated interval (s).
    pub duration: f64,
    /// True spin period at `start` (s).
    pub spin_period: f64,
    /// Change of the true spin period per second (s/s).
    pub period_drift: f64,
    /// Standard deviation of pulse timing noise (s).
    pub jitter: f64,
    /// Probability that any single observed pulse is dropped.
    pub dropout_probability: f64,
    /// Telemetry gaps: no pulses, spin unaffected.
    pub gaps: Vec<TimeRange>,
    /// Shadow windows: no pulses, period scaled by `eclipse_period_factor`.
    pub eclipses: Vec<TimeRange>,
    pub eclipse_period_factor: f64,
    /// Spacing of onboard spin-period samples (s).
    pub onboard_cadence: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start: 0.0,
            duration: 3.0 * 3600.0,
            spin_period: 3.0,
            period_drift: 0.0,
            jitter: 2e-4,
            dropout_probability: 0.0,
            gaps: Vec::new(),
            eclipses: Vec::new(),
            eclipse_period_factor: 1.0005,
            onboard_cadence: 60.0,
        }
    }
}

impl SampleConfig {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SpinModelError::InvalidConfig(msg));
        if !(self.start.is_finite() && self.duration.is_finite() && self.duration > 0.0) {
            return invalid(format!(
                "sample interval must be finite and non-empty (start={}, duration={})",
                self.start, self.duration
            ));
        }
        if !(self.spin_period.is_finite() && self.spin_period > 0.0) {
            return invalid(format!("spin period must be > 0, got {}", self.spin_period));
        }
        let end_period = self.spin_period + self.period_drift * self.duration;
        if !(end_period.is_finite() && end_period > 0.0) {
            return invalid(format!(
                "period drift {} makes the spin period non-positive",
                self.period_drift
            ));
        }
        let min_period = self.spin_period.min(end_period);
        if !(self.jitter.is_finite() && self.jitter >= 0.0 && self.jitter < 0.1 * min_period) {
            return invalid(format!(
                "jitter must be in [0, {:.4}) s, got {}",
                0.1 * min_period,
                self.jitter
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_probability) {
            return invalid(format!(
                "dropout probability must be in [0, 1), got {}",
                self.dropout_probability
            ));
        }
        if !(self.eclipse_period_factor.is_finite() && self.eclipse_period_factor > 0.0) {
            return invalid(format!(
                "eclipse period factor must be > 0, got {}",
                self.eclipse_period_factor
            ));
        }
        if !(self.onboard_cadence.is_finite() && self.onboard_cadence > 0.0) {
            return invalid(format!(
                "onboard cadence must be > 0, got {}",
                self.onboard_cadence
            ));
        }
        Ok(())
    }

    fn in_eclipse(&self, t: f64) -> bool {
        self.eclipses.iter().any(|r| r.contains(t))
    }

    /// True spin period at `t`.
    fn true_period(&self, t: f64) -> f64 {
        let period = self.spin_period + self.period_drift * (t - self.start);
        if self.in_eclipse(t) {
            period * self.eclipse_period_factor
        } else {
            period
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTelemetry {
    pub telemetry: SpinTelemetry,
    /// Every true sun-crossing time, including unobserved ones.
    pub true_pulse_times: Vec<f64>,
}

pub fn generate_telemetry(config: &SampleConfig) -> Result<SyntheticTelemetry> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, config.jitter)
        .map_err(|e| SpinModelError::InvalidConfig(format!("jitter distribution error: {e}")))?;

    let end = config.end();
    let mut true_pulse_times = Vec::new();
    let mut t = config.start;
    while t <= end {
        true_pulse_times.push(t);
        t += config.true_period(t);
    }

    let hidden = |t: f64| config.in_eclipse(t) || config.gaps.iter().any(|r| r.contains(t));
    let mut sun_pulse_times: Vec<f64> = Vec::with_capacity(true_pulse_times.len());
    for (i, &t) in true_pulse_times.iter().enumerate() {
        let dropped: f64 = rng.r#gen();
        // Keep both ends so the modeled range is the configured interval.
        let is_edge = i == 0 || i + 1 == true_pulse_times.len();
        if hidden(t) || (!is_edge && dropped < config.dropout_probability) {
            continue;
        }
        sun_pulse_times.push(t + noise.sample(&mut rng));
    }

    let onboard_spin_periods = (0u64..)
        .map(|k| config.start + config.onboard_cadence * k as f64)
        .take_while(|&time| time <= end)
        .map(|time| OnboardSpinSample {
            time,
            period: config.true_period(time),
        })
        .collect();

    Ok(SyntheticTelemetry {
        telemetry: SpinTelemetry {
            sun_pulse_times,
            onboard_spin_periods,
            shadow_intervals: config.eclipses.clone(),
        },
        true_pulse_times,
    })
}
