//! Immutable spin model for one (probe, correction level).
//!
//! A `SpinModel` owns the ordered segment sequence produced by the builder and
//! answers point and batch queries against it. Derived lookups (eclipse
//! intervals, last-pulse anchors) are computed once at construction so queries
//! never mutate anything and the model can be shared across threads by `Arc`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{
    BuilderConfig, CorrectionLevel, InterpolationResult, ProbeId, Segment, SegmentFlags,
    SpinTelemetry, TimeRange,
};
use crate::error::{Result, SpinModelError};
use crate::fit::SegmentBuilder;
use crate::math::{wrap_360, FULL_TURN};

#[derive(Debug, Clone, PartialEq)]
pub struct SpinModel {
    probe: ProbeId,
    level: CorrectionLevel,
    segments: Vec<Segment>,
    /// Per segment: time of the real pulse anchoring `time_since_last_pulse`.
    last_real_pulse: Vec<f64>,
    eclipse_intervals: Vec<TimeRange>,
}

/// Columnar interpolation output (one entry per query time).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolationSeries {
    pub times: Vec<f64>,
    pub spinphase: Vec<f64>,
    pub spinperiod: Vec<f64>,
    pub spincount: Vec<i64>,
    pub time_since_last_pulse: Vec<f64>,
    pub eclipse_delta_phi: Vec<f64>,
    pub segflags: Vec<SegmentFlags>,
}

impl InterpolationSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn push(&mut self, t: f64, r: &InterpolationResult) {
        self.times.push(t);
        self.spinphase.push(r.spinphase);
        self.spinperiod.push(r.spinperiod);
        self.spincount.push(r.spincount);
        self.time_since_last_pulse.push(r.time_since_last_pulse);
        self.eclipse_delta_phi.push(r.eclipse_delta_phi);
        self.segflags.push(r.segflags);
    }
}

/// Every segment parameter as a named parallel column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentColumns {
    pub start_time: Vec<f64>,
    pub end_time: Vec<f64>,
    pub phase_coeff_1: Vec<f64>,
    pub phase_coeff_2: Vec<f64>,
    pub bias: Vec<f64>,
    pub curvature: Vec<f64>,
    pub point_count: Vec<usize>,
    pub max_gap: Vec<f64>,
    pub phase_error: Vec<f64>,
    pub onboard_spin_period: Vec<f64>,
    pub initial_delta_phi: Vec<f64>,
    pub eclipse_drift_rate: Vec<f64>,
    pub base_spin_count: Vec<i64>,
    pub flags: Vec<SegmentFlags>,
}

impl SegmentColumns {
    pub fn len(&self) -> usize {
        self.start_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_time.is_empty()
    }
}

impl SpinModel {
    /// Wrap a segment sequence, checking that it tiles its range.
    pub fn from_segments(
        probe: ProbeId,
        level: CorrectionLevel,
        segments: Vec<Segment>,
    ) -> Result<Self> {
        if segments.is_empty() {
            return Err(SpinModelError::InvalidSegments(
                "a spin model needs at least one segment".to_string(),
            ));
        }
        for (i, seg) in segments.iter().enumerate() {
            if !(seg.start_time.is_finite() && seg.end_time.is_finite())
                || seg.end_time <= seg.start_time
            {
                return Err(SpinModelError::InvalidSegments(format!(
                    "segment {i} has an empty or invalid interval [{}, {}]",
                    seg.start_time, seg.end_time
                )));
            }
        }
        if let Some(i) = segments
            .windows(2)
            .position(|w| w[0].end_time != w[1].start_time)
        {
            return Err(SpinModelError::InvalidSegments(format!(
                "segment {} ends at {} but segment {} starts at {}",
                i,
                segments[i].end_time,
                i + 1,
                segments[i + 1].start_time
            )));
        }

        let last_real_pulse = last_pulse_anchors(&segments);
        let eclipse_intervals = merge_eclipse_intervals(&segments);

        Ok(Self {
            probe,
            level,
            segments,
            last_real_pulse,
            eclipse_intervals,
        })
    }

    pub fn probe(&self) -> &ProbeId {
        &self.probe
    }

    pub fn correction_level(&self) -> CorrectionLevel {
        self.level
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn eclipse_intervals(&self) -> &[TimeRange] {
        &self.eclipse_intervals
    }

    /// `(first start_time, last end_time)`.
    pub fn get_timerange(&self) -> (f64, f64) {
        let (first, last) = self.bounds();
        (first.start_time, last.end_time)
    }

    /// Merged eclipse intervals as parallel `(starts, ends)` vectors.
    pub fn get_eclipse_times(&self) -> (Vec<f64>, Vec<f64>) {
        self.eclipse_intervals
            .iter()
            .map(|r| (r.start, r.end))
            .unzip()
    }

    /// Spin state at `t`.
    pub fn interp(&self, t: f64) -> Result<InterpolationResult> {
        let idx = self.locate(t)?;
        let seg = &self.segments[idx];
        let dt = t - seg.start_time;

        let accumulated = seg.accumulated_phase(dt);
        let spincount = seg.base_spin_count + (accumulated / FULL_TURN).floor() as i64;
        let spinphase = wrap_360(accumulated + seg.bias);
        let spinperiod = FULL_TURN / seg.corrected_rate(dt);

        Ok(InterpolationResult {
            spinphase,
            spinperiod,
            spincount,
            time_since_last_pulse: t - self.last_real_pulse[idx],
            eclipse_delta_phi: seg.eclipse_delta_phi(dt),
            segflags: seg.flags,
        })
    }

    /// Per-point results in input order; out-of-range points fail individually.
    pub fn interp_t(&self, times: &[f64]) -> Vec<Result<InterpolationResult>> {
        times.par_iter().map(|&t| self.interp(t)).collect()
    }

    /// Columnar results; fails on the first out-of-range time (input order).
    pub fn interp_series(&self, times: &[f64]) -> Result<InterpolationSeries> {
        let results = self.interp_t(times);
        let mut series = InterpolationSeries::default();
        for (&t, result) in times.iter().zip(results) {
            series.push(t, &result?);
        }
        Ok(series)
    }

    pub fn segment_columns(&self) -> SegmentColumns {
        let mut cols = SegmentColumns::default();
        for s in &self.segments {
            cols.start_time.push(s.start_time);
            cols.end_time.push(s.end_time);
            cols.phase_coeff_1.push(s.phase_coeff_1);
            cols.phase_coeff_2.push(s.phase_coeff_2);
            cols.bias.push(s.bias);
            cols.curvature.push(s.curvature);
            cols.point_count.push(s.point_count);
            cols.max_gap.push(s.max_gap);
            cols.phase_error.push(s.phase_error);
            cols.onboard_spin_period.push(s.onboard_spin_period);
            cols.initial_delta_phi.push(s.initial_delta_phi);
            cols.eclipse_drift_rate.push(s.eclipse_drift_rate);
            cols.base_spin_count.push(s.base_spin_count);
            cols.flags.push(s.flags);
        }
        cols
    }

    fn bounds(&self) -> (&Segment, &Segment) {
        // `from_segments` guarantees at least one segment.
        let first = &self.segments[0];
        let last = &self.segments[self.segments.len() - 1];
        (first, last)
    }

    /// Index of the segment covering `t`: `[start, end)`, last one closed.
    fn locate(&self, t: f64) -> Result<usize> {
        let (start, end) = self.get_timerange();
        if t.is_nan() || t < start || t > end {
            return Err(SpinModelError::OutOfRange {
                probe: self.probe.clone(),
                level: self.level,
                t,
                start,
                end,
            });
        }
        let after = self.segments.partition_point(|s| s.start_time <= t);
        Ok(after.saturating_sub(1))
    }
}

/// Build the spin model for one (probe, level) from raw telemetry.
pub fn build_spin_model(
    probe: &ProbeId,
    level: CorrectionLevel,
    telemetry: &SpinTelemetry,
    range: Option<TimeRange>,
    config: &BuilderConfig,
) -> Result<SpinModel> {
    let builder = SegmentBuilder::new(probe.clone(), level, config.clone())?;
    let segments = builder.build(telemetry, range)?;
    SpinModel::from_segments(probe.clone(), level, segments)
}

fn last_pulse_anchors(segments: &[Segment]) -> Vec<f64> {
    let mut last_fitted_end: Option<f64> = None;
    segments
        .iter()
        .map(|s| {
            if s.flags.contains(SegmentFlags::FITTED) {
                last_fitted_end = Some(s.end_time);
                s.start_time
            } else {
                last_fitted_end.unwrap_or(s.start_time)
            }
        })
        .collect()
}

fn merge_eclipse_intervals(segments: &[Segment]) -> Vec<TimeRange> {
    let mut out: Vec<TimeRange> = Vec::new();
    for s in segments.iter().filter(|s| s.flags.is_eclipse()) {
        match out.last_mut() {
            Some(prev) if prev.end == s.start_time => prev.end = s.end_time,
            _ => out.push(TimeRange {
                start: s.start_time,
                end: s.end_time,
            }),
        }
    }
    out
}
