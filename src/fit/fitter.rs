//! Low-level fitting routine for a single segment.
//!
//! Given:
//! - pulse times `t_i` (strictly increasing)
//! - a reference spin period lookup (onboard telemetry or a fallback)
//! - the polynomial shape (`PhaseFit`)
//!
//! we:
//! - number revolutions: pulse 0 is revolution 0, each spacing adds
//!   `max(1, round(spacing / P_ref))`
//! - solve the OLS problem `360·n_i ≈ bias + c1·dt + c2·dt² + c3·dt³`
//! - report the coefficients, the worst residual and the largest spacing
//!
//! Time is normalised by the segment span (`u = dt / span`) before solving so
//! the cubic column stays well conditioned on hour-long segments; coefficients
//! are scaled back to seconds afterwards.

use nalgebra::{DMatrix, DVector};

use crate::domain::PhaseFit;
use crate::math::{median, solve_least_squares, FULL_TURN};

/// Samples used to check that the fitted spin rate stays positive.
const RATE_CHECK_SAMPLES: usize = 25;

/// Fitted phase polynomial for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseFitOutcome {
    pub bias: f64,
    pub phase_coeff_1: f64,
    pub phase_coeff_2: f64,
    pub curvature: f64,
    /// Maximum absolute residual (deg).
    pub phase_error: f64,
    /// Largest pulse spacing (s).
    pub max_gap: f64,
    /// Revolution number of the last pulse (first pulse is 0).
    pub revolutions: i64,
}

impl PhaseFitOutcome {
    /// Unwrapped phase (deg) at `dt`.
    pub fn phase(&self, dt: f64) -> f64 {
        self.bias + dt * (self.phase_coeff_1 + dt * (self.phase_coeff_2 + dt * self.curvature))
    }

    /// Spin rate (deg/s) at `dt`.
    pub fn rate(&self, dt: f64) -> f64 {
        self.phase_coeff_1 + dt * (2.0 * self.phase_coeff_2 + dt * 3.0 * self.curvature)
    }
}

/// Fit the phase polynomial over one segment's pulses.
///
/// `reference_period(t)` supplies the spin period used to count revolutions
/// across a spacing centred on `t`; when it returns `None` the median pulse
/// spacing of the segment is used.
///
/// Returns a human-readable reason on failure; the builder wraps it with
/// probe/segment context.
pub fn fit_segment_phase<F>(
    times: &[f64],
    reference_period: F,
    shape: PhaseFit,
) -> Result<PhaseFitOutcome, String>
where
    F: Fn(f64) -> Option<f64>,
{
    let n = times.len();
    if n < 2 {
        return Err(format!("{n} pulse(s), need at least 2"));
    }
    if times.iter().any(|t| !t.is_finite()) {
        return Err("non-finite pulse time".to_string());
    }

    let spacings: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    if let Some(bad) = spacings.iter().position(|d| *d <= 0.0) {
        return Err(format!(
            "pulse times not strictly increasing at t={} (duplicate or out-of-order timestamp)",
            times[bad + 1]
        ));
    }

    let median_spacing = median(&spacings).unwrap_or(spacings[0]);
    let mut revs: Vec<i64> = Vec::with_capacity(n);
    revs.push(0);
    let mut max_gap = 0.0_f64;
    for (j, &d) in spacings.iter().enumerate() {
        let mid = times[j] + 0.5 * d;
        let p_ref = reference_period(mid)
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(median_spacing);
        let step = ((d / p_ref).round() as i64).max(1);
        revs.push(revs[j] + step);
        max_gap = max_gap.max(d);
    }

    let span = times[n - 1] - times[0];
    let use_bias = shape.fit_bias && n >= 3;
    let max_degree = n - 1 - usize::from(use_bias);
    let degree = usize::from(shape.degree).min(max_degree).max(1);
    let cols = degree + usize::from(use_bias);

    let mut x = DMatrix::<f64>::zeros(n, cols);
    let mut y = DVector::<f64>::zeros(n);
    for i in 0..n {
        let u = (times[i] - times[0]) / span;
        let mut col = 0;
        if use_bias {
            x[(i, 0)] = 1.0;
            col = 1;
        }
        let mut pow = u;
        for _ in 0..degree {
            x[(i, col)] = pow;
            pow *= u;
            col += 1;
        }
        y[i] = FULL_TURN * revs[i] as f64;
    }

    let beta = solve_least_squares(&x, &y)
        .ok_or_else(|| "phase regression is rank deficient".to_string())?;

    let offset = usize::from(use_bias);
    let mut coeffs = [0.0_f64; 3];
    let mut scale = 1.0;
    for (k, coeff) in coeffs.iter_mut().enumerate().take(degree) {
        scale *= span;
        *coeff = beta[offset + k] / scale;
    }

    let outcome = PhaseFitOutcome {
        bias: if use_bias { beta[0] } else { 0.0 },
        phase_coeff_1: coeffs[0],
        phase_coeff_2: coeffs[1],
        curvature: coeffs[2],
        phase_error: 0.0,
        max_gap,
        revolutions: revs[n - 1],
    };

    if ![outcome.bias, outcome.phase_coeff_1, outcome.phase_coeff_2, outcome.curvature]
        .iter()
        .all(|c| c.is_finite())
    {
        return Err("non-finite phase coefficients".to_string());
    }
    if !rate_positive_on(|dt| outcome.rate(dt), 0.0, span) {
        return Err("fitted spin rate is not positive across the segment".to_string());
    }

    let phase_error = times
        .iter()
        .zip(revs.iter())
        .map(|(&t, &rev)| (FULL_TURN * rev as f64 - outcome.phase(t - times[0])).abs())
        .fold(0.0_f64, f64::max);

    Ok(PhaseFitOutcome {
        phase_error,
        ..outcome
    })
}

/// True when `rate(dt)` is finite and positive on a uniform grid over `[from, to]`.
pub(crate) fn rate_positive_on<F>(rate: F, from: f64, to: f64) -> bool
where
    F: Fn(f64) -> f64,
{
    (0..RATE_CHECK_SAMPLES).all(|i| {
        let u = i as f64 / (RATE_CHECK_SAMPLES as f64 - 1.0);
        let r = rate(from + u * (to - from));
        r.is_finite() && r > 0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_reference(_: f64) -> Option<f64> {
        None
    }

    #[test]
    fn constant_rate_train_recovers_rate() {
        let times: Vec<f64> = (0..100).map(|i| 1000.0 + 8.0 * i as f64).collect();
        let fit = fit_segment_phase(&times, no_reference, PhaseFit::default()).unwrap();
        assert!((fit.phase_coeff_1 - 45.0).abs() < 1e-9, "c1={}", fit.phase_coeff_1);
        assert!(fit.phase_coeff_2.abs() < 1e-9);
        assert_eq!(fit.curvature, 0.0);
        assert_eq!(fit.bias, 0.0);
        assert_eq!(fit.revolutions, 99);
        assert!(fit.phase_error < 1e-6);
        assert!((fit.max_gap - 8.0).abs() < 1e-12);
    }

    #[test]
    fn spin_up_is_captured_by_quadratic_term() {
        // phase(t) = 36 t + 0.01 t^2 (deg); pulses where phase crosses k*360.
        let (a, b) = (0.01_f64, 36.0_f64);
        let times: Vec<f64> = (0..60)
            .map(|k| {
                let target = 360.0 * k as f64;
                (-b + (b * b + 4.0 * a * target).sqrt()) / (2.0 * a)
            })
            .collect();
        let fit = fit_segment_phase(&times, no_reference, PhaseFit::default()).unwrap();
        assert!((fit.phase_coeff_1 - b).abs() < 1e-6, "c1={}", fit.phase_coeff_1);
        assert!((fit.phase_coeff_2 - a).abs() < 1e-8, "c2={}", fit.phase_coeff_2);
        assert!(fit.phase_error < 1e-6);
    }

    #[test]
    fn missing_pulse_counts_two_revolutions() {
        let times = [0.0, 8.0, 16.0, 32.0, 40.0];
        let fit = fit_segment_phase(&times, |_| Some(8.0), PhaseFit::default()).unwrap();
        assert_eq!(fit.revolutions, 5);
        assert!((fit.phase_coeff_1 - 45.0).abs() < 1e-9);
        assert!((fit.max_gap - 16.0).abs() < 1e-12);
    }

    #[test]
    fn two_pulses_fall_back_to_linear() {
        let fit = fit_segment_phase(&[10.0, 130.0], |_| Some(8.0), PhaseFit::default()).unwrap();
        assert_eq!(fit.revolutions, 15);
        assert!((fit.phase_coeff_1 - 45.0).abs() < 1e-9);
        assert_eq!(fit.phase_coeff_2, 0.0);
    }

    #[test]
    fn duplicate_timestamps_are_rejected() {
        let err = fit_segment_phase(&[0.0, 8.0, 8.0, 16.0], no_reference, PhaseFit::default())
            .unwrap_err();
        assert!(err.contains("strictly increasing"), "{err}");
    }

    #[test]
    fn rate_check_sees_dips_between_endpoints() {
        // Positive at both ends, negative in the middle.
        let rate = |dt: f64| (dt - 5.0) * (dt - 5.0) - 1.0;
        assert!(rate(0.0) > 0.0 && rate(10.0) > 0.0);
        assert!(!rate_positive_on(rate, 0.0, 10.0));
        assert!(rate_positive_on(rate, 7.0, 10.0));
    }

    #[test]
    fn bias_term_is_fitted_when_requested() {
        let times: Vec<f64> = (0..20).map(|i| 8.0 * i as f64).collect();
        let shape = PhaseFit {
            degree: 1,
            fit_bias: true,
        };
        let fit = fit_segment_phase(&times, no_reference, shape).unwrap();
        assert!(fit.bias.abs() < 1e-6);
        assert!((fit.phase_coeff_1 - 45.0).abs() < 1e-9);
    }
}
