//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during segment fitting and interpolation
//! - exported to JSON for comparison against validation datasets
//! - persisted by callers and reloaded into a `SpinModel`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpinModelError;

/// Mission-specific probe identifier (e.g. `"a"` … `"e"` for THEMIS).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeId(String);

impl ProbeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProbeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Eclipse-correction strategy applied while building segments.
///
/// The numeric level is the external selector (0 = none, higher = more
/// aggressive compensation across degraded intervals):
///
/// - `NoCorrection` (0): gaps, eclipse or not, are bridged by the trailing
///   fitted segment.
/// - `GapInterpolation` (1): ordinary gaps use a relaxed threshold; eclipse
///   gaps get a dedicated segment continuing the pre-eclipse model.
/// - `EclipseModelSubstitution` (2): eclipse segments take their spin rate
///   from the onboard spin period instead of the pre-eclipse fit.
/// - `EclipseDriftCorrection` (3): as level 2, plus a linear drift term that
///   lands the corrected phase on the first pulse after the eclipse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CorrectionLevel {
    NoCorrection,
    GapInterpolation,
    EclipseModelSubstitution,
    EclipseDriftCorrection,
}

impl CorrectionLevel {
    pub const ALL: [CorrectionLevel; 4] = [
        CorrectionLevel::NoCorrection,
        CorrectionLevel::GapInterpolation,
        CorrectionLevel::EclipseModelSubstitution,
        CorrectionLevel::EclipseDriftCorrection,
    ];

    /// Numeric level (0-3).
    pub fn level(self) -> u8 {
        match self {
            CorrectionLevel::NoCorrection => 0,
            CorrectionLevel::GapInterpolation => 1,
            CorrectionLevel::EclipseModelSubstitution => 2,
            CorrectionLevel::EclipseDriftCorrection => 3,
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            CorrectionLevel::NoCorrection => "no correction",
            CorrectionLevel::GapInterpolation => "gap interpolation",
            CorrectionLevel::EclipseModelSubstitution => "eclipse model substitution",
            CorrectionLevel::EclipseDriftCorrection => "eclipse drift correction",
        }
    }

    /// Pulse spacing above which an ordinary (non-eclipse) gap forces a boundary.
    pub fn gap_threshold(self, config: &BuilderConfig) -> f64 {
        match self {
            CorrectionLevel::NoCorrection => config.gap_threshold,
            _ => config.gap_threshold * config.relaxed_gap_factor,
        }
    }

    /// Whether eclipse gaps get a dedicated, model-predicted segment.
    pub fn bridges_eclipses(self) -> bool {
        self != CorrectionLevel::NoCorrection
    }

    /// Whether eclipse segments take their rate from onboard spin period.
    pub fn substitutes_onboard_model(self) -> bool {
        matches!(
            self,
            CorrectionLevel::EclipseModelSubstitution | CorrectionLevel::EclipseDriftCorrection
        )
    }

    /// Whether eclipse segments carry a drift term closing the exit mismatch.
    pub fn corrects_drift(self) -> bool {
        self == CorrectionLevel::EclipseDriftCorrection
    }
}

impl fmt::Display for CorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.level())
    }
}

impl From<CorrectionLevel> for u8 {
    fn from(value: CorrectionLevel) -> Self {
        value.level()
    }
}

impl TryFrom<u8> for CorrectionLevel {
    type Error = SpinModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CorrectionLevel::NoCorrection),
            1 => Ok(CorrectionLevel::GapInterpolation),
            2 => Ok(CorrectionLevel::EclipseModelSubstitution),
            3 => Ok(CorrectionLevel::EclipseDriftCorrection),
            other => Err(SpinModelError::InvalidCorrectionLevel(other)),
        }
    }
}

bitflags::bitflags! {
    /// Segment provenance bit-set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SegmentFlags: u32 {
        /// Model fitted from measured sun pulses.
        const FITTED = 1 << 0;
        /// Contains a pulse gap wider than the base gap threshold.
        const GAP_BRIDGED = 1 << 1;
        /// Overlaps a known shadow interval.
        const ECLIPSE = 1 << 2;
        /// Spin rate taken from onboard spin-period telemetry.
        const MODEL_SUBSTITUTED = 1 << 3;
        /// End extended past the last measured pulse.
        const EXTRAPOLATED = 1 << 4;
    }
}

impl SegmentFlags {
    pub fn is_eclipse(self) -> bool {
        self.contains(Self::ECLIPSE)
    }

    /// True when the segment was not fitted directly from pulses.
    pub fn is_interpolated(self) -> bool {
        !self.contains(Self::FITTED)
    }
}

/// Closed time interval in seconds since the telemetry epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Build a range, rejecting non-finite or reversed bounds.
    pub fn new(start: f64, end: f64) -> Result<Self, SpinModelError> {
        if !(start.is_finite() && end.is_finite() && end >= start) {
            return Err(SpinModelError::InvalidTelemetry(format!(
                "invalid time range [{start}, {end}]"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// True when the open interval `(a, b)` intersects this range.
    pub fn overlaps(&self, a: f64, b: f64) -> bool {
        a < self.end && b > self.start
    }
}

/// One onboard spin-period telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnboardSpinSample {
    pub time: f64,
    /// Spin period in seconds.
    pub period: f64,
}

/// Raw spin telemetry for one probe, already time-aligned and in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpinTelemetry {
    /// Sun pulse times, strictly increasing.
    pub sun_pulse_times: Vec<f64>,
    /// Onboard spin-period samples, ordered by time.
    pub onboard_spin_periods: Vec<OnboardSpinSample>,
    /// Known shadow (eclipse) windows.
    pub shadow_intervals: Vec<TimeRange>,
}

impl SpinTelemetry {
    /// Span covered by the sun pulses, if any.
    pub fn pulse_span(&self) -> Option<TimeRange> {
        let first = *self.sun_pulse_times.first()?;
        let last = *self.sun_pulse_times.last()?;
        TimeRange::new(first, last).ok()
    }

    /// Onboard period nearest in time to `t`.
    pub fn onboard_period_near(&self, t: f64) -> Option<f64> {
        nearest_onboard_period(&self.onboard_spin_periods, t)
    }
}

pub(crate) fn nearest_onboard_period(samples: &[OnboardSpinSample], t: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let idx = samples.partition_point(|s| s.time < t);
    let after = samples.get(idx);
    let before = idx.checked_sub(1).and_then(|i| samples.get(i));
    match (before, after) {
        (Some(b), Some(a)) => {
            if (t - b.time) <= (a.time - t) {
                Some(b.period)
            } else {
                Some(a.period)
            }
        }
        (Some(b), None) => Some(b.period),
        (None, Some(a)) => Some(a.period),
        (None, None) => None,
    }
}

/// Shape of the per-segment phase polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFit {
    /// Highest power of `dt` (1 = constant rate, 2 = rate + acceleration, 3 = cubic).
    pub degree: u8,
    /// Fit a constant phase offset instead of pinning phase 0 at the first pulse.
    ///
    /// The offset only moves the reported `spinphase`. Spin counts step where
    /// the phase accumulated since the segment start crosses a whole turn, so
    /// at a count step `spinphase` reads `bias` rather than 0.
    pub fit_bias: bool,
}

impl Default for PhaseFit {
    fn default() -> Self {
        Self {
            degree: 2,
            fit_bias: false,
        }
    }
}

/// Segment builder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Minimum number of pulses in range for a model to be built.
    pub min_pulses: usize,
    /// Pulse spacing (s) above which a gap forces a segment boundary.
    pub gap_threshold: f64,
    /// Multiplier on `gap_threshold` for ordinary gaps at correction levels >= 1.
    pub relaxed_gap_factor: f64,
    /// Relative onboard spin-period jump treated as a telemetry mode change.
    pub mode_change_tolerance: f64,
    /// Phase polynomial shape.
    pub phase_fit: PhaseFit,
    /// Maximum extension (s) of the last segment toward the requested range end.
    pub max_extrapolation: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            min_pulses: 3,
            gap_threshold: 30.0,
            relaxed_gap_factor: 4.0,
            mode_change_tolerance: 0.01,
            phase_fit: PhaseFit::default(),
            max_extrapolation: 0.0,
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<(), SpinModelError> {
        if self.min_pulses < 2 {
            return Err(SpinModelError::InvalidConfig(format!(
                "min_pulses must be >= 2, got {}",
                self.min_pulses
            )));
        }
        if !(self.gap_threshold.is_finite() && self.gap_threshold > 0.0) {
            return Err(SpinModelError::InvalidConfig(format!(
                "gap_threshold must be finite and > 0, got {}",
                self.gap_threshold
            )));
        }
        if !(self.relaxed_gap_factor.is_finite() && self.relaxed_gap_factor >= 1.0) {
            return Err(SpinModelError::InvalidConfig(format!(
                "relaxed_gap_factor must be finite and >= 1, got {}",
                self.relaxed_gap_factor
            )));
        }
        if !(self.mode_change_tolerance.is_finite() && self.mode_change_tolerance > 0.0) {
            return Err(SpinModelError::InvalidConfig(format!(
                "mode_change_tolerance must be finite and > 0, got {}",
                self.mode_change_tolerance
            )));
        }
        if !(1..=3).contains(&self.phase_fit.degree) {
            return Err(SpinModelError::InvalidConfig(format!(
                "phase_fit.degree must be 1, 2 or 3, got {}",
                self.phase_fit.degree
            )));
        }
        if !(self.max_extrapolation.is_finite() && self.max_extrapolation >= 0.0) {
            return Err(SpinModelError::InvalidConfig(format!(
                "max_extrapolation must be finite and >= 0, got {}",
                self.max_extrapolation
            )));
        }
        Ok(())
    }
}

/// One calibration interval with its fitted phase model.
///
/// Accumulated phase (degrees) at `dt = t - start_time`:
///
/// ```text
/// φ(dt) = bias + phase_coeff_1·dt + phase_coeff_2·dt² + curvature·dt³
/// ```
///
/// plus, in eclipse segments, `initial_delta_phi + eclipse_drift_rate·dt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    /// Spin rate at `start_time` (deg/s).
    pub phase_coeff_1: f64,
    /// Half the angular acceleration (deg/s²).
    pub phase_coeff_2: f64,
    /// Constant phase offset (deg).
    pub bias: f64,
    /// Cubic phase term (deg/s³).
    pub curvature: f64,
    pub point_count: usize,
    pub max_gap: f64,
    /// Maximum absolute phase residual (deg).
    pub phase_error: f64,
    pub onboard_spin_period: f64,
    pub initial_delta_phi: f64,
    /// Eclipse phase drift (deg/s); zero unless drift-corrected.
    pub eclipse_drift_rate: f64,
    /// Revolutions completed since the model epoch at `start_time`.
    pub base_spin_count: i64,
    pub flags: SegmentFlags,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Fitted phase (deg, unwrapped, bias included) at `dt`.
    pub fn raw_phase(&self, dt: f64) -> f64 {
        self.bias + dt * (self.phase_coeff_1 + dt * (self.phase_coeff_2 + dt * self.curvature))
    }

    /// Fitted spin rate (deg/s) at `dt`.
    pub fn phase_rate(&self, dt: f64) -> f64 {
        self.phase_coeff_1 + dt * (2.0 * self.phase_coeff_2 + dt * 3.0 * self.curvature)
    }

    /// Eclipse correction (deg) at `dt`; zero outside eclipse segments.
    pub fn eclipse_delta_phi(&self, dt: f64) -> f64 {
        if self.flags.is_eclipse() {
            self.initial_delta_phi + self.eclipse_drift_rate * dt
        } else {
            0.0
        }
    }

    /// Phase accumulated since `start_time` (deg), eclipse correction included.
    ///
    /// Spin counts are derived from this quantity, so `bias` is excluded: it
    /// shifts the reported phase but never the revolution bookkeeping.
    pub fn accumulated_phase(&self, dt: f64) -> f64 {
        self.raw_phase(dt) - self.bias + self.eclipse_delta_phi(dt)
    }

    /// Spin rate (deg/s) at `dt`, eclipse drift included.
    pub fn corrected_rate(&self, dt: f64) -> f64 {
        let drift = if self.flags.is_eclipse() {
            self.eclipse_drift_rate
        } else {
            0.0
        };
        self.phase_rate(dt) + drift
    }
}

/// Spin state at one queried instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationResult {
    /// Spin phase in degrees, `[0, 360)`.
    pub spinphase: f64,
    /// Instantaneous spin period (s).
    pub spinperiod: f64,
    /// Completed revolutions since the model epoch.
    pub spincount: i64,
    /// Seconds since the most recent real sun pulse anchor.
    pub time_since_last_pulse: f64,
    /// Eclipse correction applied to `spinphase` (deg).
    pub eclipse_delta_phi: f64,
    pub segflags: SegmentFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_level_round_trips_through_u8() {
        for level in CorrectionLevel::ALL {
            assert_eq!(CorrectionLevel::try_from(level.level()).unwrap(), level);
        }
        assert_eq!(
            CorrectionLevel::try_from(4),
            Err(SpinModelError::InvalidCorrectionLevel(4))
        );
    }

    #[test]
    fn relaxed_threshold_only_above_level_zero() {
        let cfg = BuilderConfig::default();
        assert_eq!(CorrectionLevel::NoCorrection.gap_threshold(&cfg), 30.0);
        assert_eq!(CorrectionLevel::GapInterpolation.gap_threshold(&cfg), 120.0);
        assert!(!CorrectionLevel::NoCorrection.bridges_eclipses());
        assert!(CorrectionLevel::EclipseDriftCorrection.corrects_drift());
        assert!(!CorrectionLevel::GapInterpolation.substitutes_onboard_model());
    }

    #[test]
    fn flags_compose() {
        let mut flags = SegmentFlags::FITTED | SegmentFlags::GAP_BRIDGED;
        assert!(flags.contains(SegmentFlags::FITTED));
        assert!(!flags.is_eclipse());
        assert!(!flags.is_interpolated());
        flags.insert(SegmentFlags::ECLIPSE);
        assert_eq!(flags.bits(), 7);
        assert!(SegmentFlags::ECLIPSE.is_interpolated());
        assert_eq!(SegmentFlags::from_bits(1 << 4), Some(SegmentFlags::EXTRAPOLATED));
        assert_eq!(SegmentFlags::from_bits(1 << 5), None);
        assert!(SegmentFlags::default().is_empty());
    }

    #[test]
    fn nearest_onboard_period_picks_closest_sample() {
        let samples = [
            OnboardSpinSample { time: 0.0, period: 3.0 },
            OnboardSpinSample { time: 10.0, period: 3.1 },
        ];
        assert_eq!(nearest_onboard_period(&samples, -5.0), Some(3.0));
        assert_eq!(nearest_onboard_period(&samples, 4.0), Some(3.0));
        assert_eq!(nearest_onboard_period(&samples, 6.0), Some(3.1));
        assert_eq!(nearest_onboard_period(&samples, 50.0), Some(3.1));
        assert_eq!(nearest_onboard_period(&[], 1.0), None);
    }

    #[test]
    fn default_config_is_valid_and_bad_values_rejected() {
        assert!(BuilderConfig::default().validate().is_ok());
        let cfg = BuilderConfig {
            phase_fit: PhaseFit {
                degree: 4,
                fit_bias: false,
            },
            ..BuilderConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SpinModelError::InvalidConfig(_))));
    }

    #[test]
    fn segment_evaluates_polynomial() {
        let seg = Segment {
            start_time: 100.0,
            end_time: 200.0,
            phase_coeff_1: 45.0,
            phase_coeff_2: 0.5,
            bias: 0.0,
            curvature: 0.0,
            point_count: 10,
            max_gap: 8.0,
            phase_error: 0.0,
            onboard_spin_period: 8.0,
            initial_delta_phi: 2.0,
            eclipse_drift_rate: 0.1,
            base_spin_count: 0,
            flags: SegmentFlags::FITTED,
        };
        assert!((seg.raw_phase(2.0) - 92.0).abs() < 1e-12);
        assert!((seg.phase_rate(2.0) - 47.0).abs() < 1e-12);
        // Not an eclipse segment: correction ignored.
        assert_eq!(seg.eclipse_delta_phi(10.0), 0.0);

        let eclipse = Segment {
            flags: SegmentFlags::ECLIPSE,
            ..seg
        };
        assert!((eclipse.eclipse_delta_phi(10.0) - 3.0).abs() < 1e-12);
        assert!((eclipse.corrected_rate(0.0) - 45.1).abs() < 1e-12);
    }
}
