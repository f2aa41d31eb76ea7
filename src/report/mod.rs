//! Reporting utilities: model summaries and truth comparisons.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{CorrectionLevel, SegmentFlags};
use crate::error::Result;
use crate::math::wrap_180;
use crate::models::SpinModel;

/// Headline numbers for one built model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub level: CorrectionLevel,
    pub start: f64,
    pub end: f64,
    pub segments: usize,
    pub fitted_segments: usize,
    pub gap_bridged_segments: usize,
    pub eclipse_intervals: usize,
    pub max_phase_error: f64,
    /// Spin count at the end of the modeled range.
    pub total_revolutions: i64,
}

/// Model phase at known true pulse times (where phase should be 0).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruthComparison {
    pub samples: usize,
    pub max_abs_phase_error: f64,
    pub rms_phase_error: f64,
}

pub fn summarize_model(model: &SpinModel) -> Result<ModelSummary> {
    let (start, end) = model.get_timerange();
    let segments = model.segments();
    let count = |flag: SegmentFlags| segments.iter().filter(|s| s.flags.contains(flag)).count();

    Ok(ModelSummary {
        level: model.correction_level(),
        start,
        end,
        segments: segments.len(),
        fitted_segments: count(SegmentFlags::FITTED),
        gap_bridged_segments: count(SegmentFlags::GAP_BRIDGED),
        eclipse_intervals: model.eclipse_intervals().len(),
        max_phase_error: segments
            .iter()
            .map(|s| s.phase_error)
            .fold(0.0_f64, f64::max),
        total_revolutions: model.interp(end)?.spincount,
    })
}

/// Compare model phase against true pulse times inside the modeled range.
///
/// Returns `None` when no true pulse falls in range.
pub fn compare_to_truth(model: &SpinModel, true_pulse_times: &[f64]) -> Option<TruthComparison> {
    let (start, end) = model.get_timerange();
    let errors: Vec<f64> = true_pulse_times
        .iter()
        .copied()
        .filter(|t| *t >= start && *t <= end)
        .filter_map(|t| model.interp(t).ok())
        .map(|r| wrap_180(r.spinphase))
        .collect();
    if errors.is_empty() {
        return None;
    }

    let max_abs_phase_error = errors.iter().map(|e| e.abs()).fold(0.0_f64, f64::max);
    let rms_phase_error = (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt();

    Some(TruthComparison {
        samples: errors.len(),
        max_abs_phase_error,
        rms_phase_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuilderConfig, ProbeId, SpinTelemetry};
    use crate::models::build_spin_model;

    fn model() -> SpinModel {
        let telemetry = SpinTelemetry {
            sun_pulse_times: (0..=100).map(|i| 3.0 * i as f64).collect(),
            ..SpinTelemetry::default()
        };
        build_spin_model(
            &ProbeId::new("a"),
            CorrectionLevel::NoCorrection,
            &telemetry,
            None,
            &BuilderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn summary_counts_segments() {
        let summary = summarize_model(&model()).unwrap();
        assert_eq!(summary.segments, 1);
        assert_eq!(summary.fitted_segments, 1);
        assert_eq!(summary.gap_bridged_segments, 0);
        assert_eq!(summary.eclipse_intervals, 0);
        assert_eq!(summary.end, 300.0);
        assert!(summary.total_revolutions == 99 || summary.total_revolutions == 100);
    }

    #[test]
    fn truth_comparison_on_exact_pulses_is_zero() {
        let truth: Vec<f64> = (-5..=105).map(|i| 3.0 * i as f64).collect();
        let cmp = compare_to_truth(&model(), &truth).unwrap();
        assert_eq!(cmp.samples, 101);
        assert!(cmp.max_abs_phase_error < 1e-6);
        assert!(cmp.rms_phase_error <= cmp.max_abs_phase_error);

        assert!(compare_to_truth(&model(), &[-10.0, 1000.0]).is_none());
    }
}
