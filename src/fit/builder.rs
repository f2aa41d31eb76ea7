//! Segment building orchestration.
//!
//! Responsibilities:
//!
//! - select the pulses inside the requested range and enforce the minimum count
//! - partition them into runs (gaps, eclipse gaps, onboard mode changes)
//! - fit one segment per run, chaining revolution baselines so spin counts
//!   never step backwards
//! - bridge eclipse gaps according to the correction level
//! - optionally extrapolate the last segment to the range end

use log::{debug, info, warn};

use crate::domain::{
    nearest_onboard_period, BuilderConfig, CorrectionLevel, OnboardSpinSample, ProbeId, Segment,
    SegmentFlags, SpinTelemetry, TimeRange,
};
use crate::error::{Result, SpinModelError};
use crate::fit::fitter::{fit_segment_phase, rate_positive_on};
use crate::fit::partition::{partition_pulses, BreakKind};
use crate::math::{median, wrap_180, FULL_TURN};

/// Builds the ordered segment sequence for one (probe, correction level).
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    probe: ProbeId,
    level: CorrectionLevel,
    config: BuilderConfig,
}

impl SegmentBuilder {
    pub fn new(probe: ProbeId, level: CorrectionLevel, config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            probe,
            level,
            config,
        })
    }

    pub fn probe(&self) -> &ProbeId {
        &self.probe
    }

    pub fn level(&self) -> CorrectionLevel {
        self.level
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build segments from telemetry over `range` (default: the pulse span).
    pub fn build(&self, telemetry: &SpinTelemetry, range: Option<TimeRange>) -> Result<Vec<Segment>> {
        validate_telemetry(telemetry)?;

        let Some(range) = range.or_else(|| telemetry.pulse_span()) else {
            return Err(self.insufficient(f64::NAN, f64::NAN, 0));
        };

        let pulses: Vec<f64> = telemetry
            .sun_pulse_times
            .iter()
            .copied()
            .filter(|t| range.contains(*t))
            .collect();
        if pulses.len() < self.config.min_pulses {
            return Err(self.insufficient(range.start, range.end, pulses.len()));
        }

        let runs = partition_pulses(
            &pulses,
            &telemetry.onboard_spin_periods,
            &telemetry.shadow_intervals,
            self.level,
            &self.config,
        );

        let mut segments: Vec<Segment> = Vec::with_capacity(runs.len() * 2);
        // Revolution number of the last segment's final pulse, relative to its start.
        let mut last_revs: i64 = 0;

        for run in &runs {
            let Some(brk) = run.leading else {
                let (seg, revs) =
                    self.fit_run(&pulses[run.first..=run.last], 0, None, telemetry, 0)?;
                segments.push(seg);
                last_revs = revs;
                continue;
            };

            let Some(prev) = segments.last() else {
                return Err(SpinModelError::InvalidSegments(
                    "run boundary without a preceding segment".to_string(),
                ));
            };
            let base = prev.base_spin_count + last_revs;

            if brk.kind == BreakKind::EclipseGap && self.level.bridges_eclipses() {
                let p_a = pulses[run.first - 1];
                let p_b = pulses[run.first];
                let (eclipse, eclipse_revs) =
                    self.eclipse_segment(prev, p_a, p_b, base, telemetry, segments.len())?;
                segments.push(eclipse);
                last_revs = eclipse_revs;
                if run.pulse_count() < 2 {
                    // A lone exit pulse only closes the eclipse segment.
                    continue;
                }

                let index = segments.len();
                let (seg, revs) = self.fit_run(
                    &pulses[run.first..=run.last],
                    base + eclipse_revs,
                    segments.last(),
                    telemetry,
                    index,
                )?;
                segments.push(seg);
                last_revs = revs;
            } else {
                // The trailing segment owns the last pulse before the break so
                // the tiling has no hole.
                let index = segments.len();
                let (seg, revs) = self.fit_run(
                    &pulses[run.first - 1..=run.last],
                    base,
                    segments.last(),
                    telemetry,
                    index,
                )?;
                segments.push(seg);
                last_revs = revs;
            }
        }

        self.extrapolate_tail(&mut segments, range);

        info!(
            "built {} segments for probe {} ({}) over [{:.3}, {:.3}] from {} pulses",
            segments.len(),
            self.probe,
            self.level,
            range.start,
            range.end,
            pulses.len()
        );

        Ok(segments)
    }

    fn fit_run(
        &self,
        times: &[f64],
        base_spin_count: i64,
        prev: Option<&Segment>,
        telemetry: &SpinTelemetry,
        index: usize,
    ) -> Result<(Segment, i64)> {
        let start = times[0];
        let end = times[times.len() - 1];
        let samples = &telemetry.onboard_spin_periods;
        let prev_period = prev
            .map(|p| FULL_TURN / p.corrected_rate(p.duration()))
            .filter(|p| p.is_finite() && *p > 0.0);

        let fit = fit_segment_phase(
            times,
            |t| nearest_onboard_period(samples, t).or(prev_period),
            self.config.phase_fit,
        )
        .map_err(|reason| self.degenerate(index, start, end, reason))?;

        let mut flags = SegmentFlags::FITTED;
        if fit.max_gap > self.config.gap_threshold {
            flags |= SegmentFlags::GAP_BRIDGED;
        }
        let crosses_shadow = times.windows(2).any(|w| {
            w[1] - w[0] > self.config.gap_threshold
                && telemetry.shadow_intervals.iter().any(|s| s.overlaps(w[0], w[1]))
        });
        if crosses_shadow {
            flags |= SegmentFlags::ECLIPSE;
            if self.level.bridges_eclipses() {
                warn!(
                    "probe {} ({}): segment {index} [{start:.3}, {end:.3}] is fitted across an eclipse, no pre-eclipse model to continue",
                    self.probe, self.level
                );
            }
        }

        let initial_delta_phi = prev
            .map(|p| wrap_180(p.accumulated_phase(start - p.start_time)))
            .unwrap_or(0.0);

        let onboard_spin_period = onboard_period_between(samples, start, end)
            .unwrap_or_else(|| FULL_TURN / fit.rate(0.5 * (end - start)));

        let segment = Segment {
            start_time: start,
            end_time: end,
            phase_coeff_1: fit.phase_coeff_1,
            phase_coeff_2: fit.phase_coeff_2,
            bias: fit.bias,
            curvature: fit.curvature,
            point_count: times.len(),
            max_gap: fit.max_gap,
            phase_error: fit.phase_error,
            onboard_spin_period,
            initial_delta_phi,
            eclipse_drift_rate: 0.0,
            base_spin_count,
            flags,
        };

        debug!(
            "segment {index}: [{start:.3}, {end:.3}] n={} rate={:.6} deg/s maxgap={:.3} phaserr={:.3e} flags={}",
            segment.point_count,
            segment.phase_coeff_1,
            segment.max_gap,
            segment.phase_error,
            segment.flags.bits()
        );

        Ok((segment, fit.revolutions))
    }

    /// Dedicated segment spanning an eclipse gap `[p_a, p_b]`.
    ///
    /// Returns the segment and the number of revolutions it spans.
    fn eclipse_segment(
        &self,
        prev: &Segment,
        p_a: f64,
        p_b: f64,
        base_spin_count: i64,
        telemetry: &SpinTelemetry,
        index: usize,
    ) -> Result<(Segment, i64)> {
        let dt_a = p_a - prev.start_time;
        let duration = p_b - p_a;
        let initial_delta_phi = wrap_180(prev.accumulated_phase(dt_a));
        let onboard = onboard_period_between(&telemetry.onboard_spin_periods, p_a, p_b);

        let mut flags = SegmentFlags::ECLIPSE | SegmentFlags::GAP_BRIDGED;

        // Taylor re-expansion of the previous model about the gap start.
        let continuation = (
            prev.phase_rate(dt_a),
            prev.phase_coeff_2 + 3.0 * prev.curvature * dt_a,
            prev.curvature,
        );
        let (c1, c2, c3) = if self.level.substitutes_onboard_model() {
            match onboard {
                Some(period) => {
                    flags |= SegmentFlags::MODEL_SUBSTITUTED;
                    (FULL_TURN / period, 0.0, 0.0)
                }
                None => {
                    warn!(
                        "probe {} ({}): no onboard spin period for eclipse [{p_a:.3}, {p_b:.3}], continuing previous model",
                        self.probe, self.level
                    );
                    continuation
                }
            }
        } else {
            continuation
        };

        let mut segment = Segment {
            start_time: p_a,
            end_time: p_b,
            phase_coeff_1: c1,
            phase_coeff_2: c2,
            bias: 0.0,
            curvature: c3,
            point_count: 2,
            max_gap: duration,
            phase_error: 0.0,
            onboard_spin_period: onboard.unwrap_or(FULL_TURN / c1),
            initial_delta_phi,
            eclipse_drift_rate: 0.0,
            base_spin_count,
            flags,
        };

        let exit_phase = segment.raw_phase(duration) + initial_delta_phi;
        let revs = ((exit_phase / FULL_TURN).round() as i64).max(1);
        let mismatch = FULL_TURN * revs as f64 - exit_phase;
        if self.level.corrects_drift() {
            segment.eclipse_drift_rate = mismatch / duration;
        }
        segment.phase_error = mismatch.abs();

        let rates_ok = rate_positive_on(|dt| segment.corrected_rate(dt), 0.0, duration);
        if !rates_ok || !exit_phase.is_finite() {
            return Err(self.degenerate(
                index,
                p_a,
                p_b,
                "eclipse model has a non-positive spin rate".to_string(),
            ));
        }

        debug!(
            "segment {index}: eclipse [{p_a:.3}, {p_b:.3}] revs={revs} initial_dphi={initial_delta_phi:.4} exit_mismatch={mismatch:.4} flags={}",
            segment.flags.bits()
        );

        Ok((segment, revs))
    }

    fn extrapolate_tail(&self, segments: &mut [Segment], range: TimeRange) {
        if self.config.max_extrapolation <= 0.0 {
            return;
        }
        let Some(last) = segments.last_mut() else {
            return;
        };
        let tail = range.end - last.end_time;
        if !(tail > 0.0 && tail <= self.config.max_extrapolation) {
            return;
        }
        let (from, to) = (last.duration(), range.end - last.start_time);
        if !rate_positive_on(|dt| last.corrected_rate(dt), from, to) {
            warn!(
                "probe {} ({}): not extrapolating to {:.3}, spin rate turns non-positive",
                self.probe, self.level, range.end
            );
            return;
        }
        last.end_time = range.end;
        last.flags |= SegmentFlags::EXTRAPOLATED;
    }

    fn insufficient(&self, start: f64, end: f64, found: usize) -> SpinModelError {
        SpinModelError::InsufficientData {
            probe: self.probe.clone(),
            level: self.level,
            start,
            end,
            found,
            required: self.config.min_pulses,
        }
    }

    fn degenerate(&self, index: usize, start: f64, end: f64, reason: String) -> SpinModelError {
        SpinModelError::DegenerateFit {
            probe: self.probe.clone(),
            level: self.level,
            segment_index: index,
            start,
            end,
            reason,
        }
    }
}

/// Median onboard period inside `[start, end]`, else the sample nearest the midpoint.
fn onboard_period_between(samples: &[OnboardSpinSample], start: f64, end: f64) -> Option<f64> {
    let inside: Vec<f64> = samples
        .iter()
        .filter(|s| s.time >= start && s.time <= end)
        .map(|s| s.period)
        .collect();
    median(&inside).or_else(|| nearest_onboard_period(samples, 0.5 * (start + end)))
}

fn validate_telemetry(telemetry: &SpinTelemetry) -> Result<()> {
    if let Some(t) = telemetry.sun_pulse_times.iter().find(|t| !t.is_finite()) {
        return Err(SpinModelError::InvalidTelemetry(format!(
            "non-finite sun pulse time {t}"
        )));
    }
    for s in &telemetry.onboard_spin_periods {
        if !(s.time.is_finite() && s.period.is_finite() && s.period > 0.0) {
            return Err(SpinModelError::InvalidTelemetry(format!(
                "invalid onboard spin period sample (time={}, period={})",
                s.time, s.period
            )));
        }
    }
    if telemetry
        .onboard_spin_periods
        .windows(2)
        .any(|w| w[1].time < w[0].time)
    {
        return Err(SpinModelError::InvalidTelemetry(
            "onboard spin period samples are not ordered by time".to_string(),
        ));
    }
    for r in &telemetry.shadow_intervals {
        if !(r.start.is_finite() && r.end.is_finite() && r.end >= r.start) {
            return Err(SpinModelError::InvalidTelemetry(format!(
                "invalid shadow interval [{}, {}]",
                r.start, r.end
            )));
        }
    }
    Ok(())
}
