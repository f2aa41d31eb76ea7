//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the model/fitting code stays clean and testable
//! - output changes are localized

use chrono::{DateTime, Duration, Utc};

use crate::domain::SegmentFlags;
use crate::models::{InterpolationSeries, SpinModel};
use crate::report::{ModelSummary, TruthComparison};

/// Header block for one model: probe, level, range, headline numbers.
pub fn format_model_summary(
    model: &SpinModel,
    summary: &ModelSummary,
    epoch: Option<DateTime<Utc>>,
) -> String {
    let mut out = String::new();

    out.push_str("=== spin - sun pulse spin model ===\n");
    out.push_str(&format!("Probe: {}\n", model.probe()));
    out.push_str(&format!(
        "Correction: {} ({})\n",
        summary.level,
        summary.level.display_name()
    ));
    out.push_str(&format!(
        "Range: {} -> {} ({:.1} s)\n",
        fmt_time(summary.start, epoch),
        fmt_time(summary.end, epoch),
        summary.end - summary.start
    ));
    out.push_str(&format!(
        "Segments: n={} | fitted={} | gap-bridged={} | eclipses={}\n",
        summary.segments,
        summary.fitted_segments,
        summary.gap_bridged_segments,
        summary.eclipse_intervals
    ));
    out.push_str(&format!(
        "Max phase error: {:.4} deg | revolutions: {}\n",
        summary.max_phase_error, summary.total_revolutions
    ));

    let (starts, ends) = model.get_eclipse_times();
    for (s, e) in starts.iter().zip(&ends) {
        out.push_str(&format!(
            "  eclipse {} -> {} ({:.1} s)\n",
            fmt_time(*s, epoch),
            fmt_time(*e, epoch),
            e - s
        ));
    }
    out.push('\n');

    out
}

pub fn format_segment_table(model: &SpinModel) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>4} {:>12} {:>12} {:>12} {:>12} {:>6} {:>9} {:>10} {:>9} {:>8} {:<6}\n",
            "#", "start", "end", "c1", "c2", "npts", "maxgap", "phaserr", "dphi0", "count0", "flags"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<4} {:-<12} {:-<12} {:-<12} {:-<12} {:-<6} {:-<9} {:-<10} {:-<9} {:-<8} {:-<6}\n",
            "", "", "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for (i, s) in model.segments().iter().enumerate() {
        out.push_str(
            format!(
                "{:>4} {:>12.3} {:>12.3} {:>12.6} {:>12.3e} {:>6} {:>9.3} {:>10.4} {:>9.4} {:>8} {:<6}\n",
                i,
                s.start_time,
                s.end_time,
                s.phase_coeff_1,
                s.phase_coeff_2,
                s.point_count,
                s.max_gap,
                s.phase_error,
                s.initial_delta_phi,
                s.base_spin_count,
                fmt_flags(s.flags),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

pub fn format_interp_table(series: &InterpolationSeries, epoch: Option<DateTime<Utc>>) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<26} {:>10} {:>10} {:>10} {:>10} {:>9} {:<6}\n",
            "time", "phase", "period", "count", "t_last", "dphi", "flags"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<26} {:-<10} {:-<10} {:-<10} {:-<10} {:-<9} {:-<6}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for i in 0..series.len() {
        out.push_str(
            format!(
                "{:<26} {:>10.4} {:>10.6} {:>10} {:>10.3} {:>9.4} {:<6}\n",
                fmt_time(series.times[i], epoch),
                series.spinphase[i],
                series.spinperiod[i],
                series.spincount[i],
                series.time_since_last_pulse[i],
                series.eclipse_delta_phi[i],
                fmt_flags(series.segflags[i]),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Side-by-side comparison of the correction levels.
pub fn format_level_comparison(rows: &[(ModelSummary, Option<TruthComparison>)]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<8} {:<28} {:>5} {:>8} {:>9} {:>12} {:>12} {:>12}\n",
            "level", "strategy", "segs", "eclipses", "revs", "max phaserr", "truth max", "truth rms"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<8} {:-<28} {:-<5} {:-<8} {:-<9} {:-<12} {:-<12} {:-<12}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for (summary, truth) in rows {
        let (truth_max, truth_rms) = match truth {
            Some(t) => (
                format!("{:.4}", t.max_abs_phase_error),
                format!("{:.4}", t.rms_phase_error),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        out.push_str(
            format!(
                "{:<8} {:<28} {:>5} {:>8} {:>9} {:>12.4} {:>12} {:>12}\n",
                summary.level.level(),
                summary.level.display_name(),
                summary.segments,
                summary.eclipse_intervals,
                summary.total_revolutions,
                summary.max_phase_error,
                truth_max,
                truth_rms,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Seconds since epoch as UTC when an epoch is known, else plain seconds.
pub fn fmt_time(t: f64, epoch: Option<DateTime<Utc>>) -> String {
    let Some(epoch) = epoch else {
        return format!("{t:.3}");
    };
    let micros = (t * 1e6).round();
    if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
        return format!("{t:.3}");
    }
    match epoch.checked_add_signed(Duration::microseconds(micros as i64)) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{t:.3}"),
    }
}

/// Compact flag letters: F(itted) G(ap) E(clipse) S(ubstituted) X(trapolated).
pub fn fmt_flags(flags: SegmentFlags) -> String {
    [
        (SegmentFlags::FITTED, 'F'),
        (SegmentFlags::GAP_BRIDGED, 'G'),
        (SegmentFlags::ECLIPSE, 'E'),
        (SegmentFlags::MODEL_SUBSTITUTED, 'S'),
        (SegmentFlags::EXTRAPOLATED, 'X'),
    ]
    .iter()
    .map(|&(flag, c)| if flags.contains(flag) { c } else { '.' })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn flags_render_as_letters() {
        assert_eq!(fmt_flags(SegmentFlags::FITTED), "F....");
        assert_eq!(
            fmt_flags(SegmentFlags::ECLIPSE | SegmentFlags::GAP_BRIDGED | SegmentFlags::MODEL_SUBSTITUTED),
            ".GES."
        );
    }

    #[test]
    fn times_render_against_epoch() {
        let epoch = Utc.with_ymd_and_hms(2008, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(fmt_time(3661.5, Some(epoch)), "2008-03-01 01:01:01.500");
        assert_eq!(fmt_time(12.0, None), "12.000");
    }

    #[test]
    fn interp_table_has_one_row_per_time() {
        let series = InterpolationSeries {
            times: vec![0.0, 1.0],
            spinphase: vec![0.0, 120.0],
            spinperiod: vec![3.0, 3.0],
            spincount: vec![0, 0],
            time_since_last_pulse: vec![0.0, 1.0],
            eclipse_delta_phi: vec![0.0, 0.0],
            segflags: vec![SegmentFlags::FITTED; 2],
        };
        let table = format_interp_table(&series, None);
        assert_eq!(table.lines().count(), 4);
        assert!(table.lines().nth(3).unwrap().contains("120.0000"));
    }
}
