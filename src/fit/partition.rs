//! Pulse partitioning: where segment boundaries fall.
//!
//! A boundary is placed between two consecutive pulses when:
//! - their spacing overlaps a known shadow interval and exceeds the base gap
//!   threshold (eclipse gap)
//! - their spacing exceeds the correction level's ordinary gap threshold
//! - an onboard spin-period mode change falls between them
//!
//! Partitioning is deterministic and works on indices into the pulse slice so
//! the builder can decide per strategy which pulses each segment owns.

use crate::domain::{BuilderConfig, CorrectionLevel, OnboardSpinSample, TimeRange};

/// Why two consecutive runs were split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Gap,
    EclipseGap,
    ModeChange,
}

/// Boundary preceding a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunBreak {
    pub kind: BreakKind,
    /// Spacing (s) between the last pulse before and the first pulse after.
    pub width: f64,
}

/// Maximal run of pulses without a boundary, as inclusive pulse indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseRun {
    pub first: usize,
    pub last: usize,
    /// `None` only for the first run.
    pub leading: Option<RunBreak>,
}

impl PulseRun {
    /// Number of pulses in the run (never zero).
    pub fn pulse_count(&self) -> usize {
        self.last - self.first + 1
    }
}

/// Split pulses into runs.
///
/// Runs holding a single pulse are merged into the following run (or into the
/// preceding one when last), so every run supports a fit. At levels that
/// bridge eclipses, a lone pulse next to an eclipse gap keeps its own run.
pub fn partition_pulses(
    pulses: &[f64],
    onboard: &[OnboardSpinSample],
    shadows: &[TimeRange],
    level: CorrectionLevel,
    config: &BuilderConfig,
) -> Vec<PulseRun> {
    if pulses.is_empty() {
        return Vec::new();
    }

    let base_threshold = config.gap_threshold;
    let ordinary_threshold = level.gap_threshold(config);
    let changes = mode_change_times(onboard, config.mode_change_tolerance);
    let mut change_idx = 0usize;

    let mut runs = Vec::new();
    let mut current = PulseRun {
        first: 0,
        last: 0,
        leading: None,
    };

    for j in 1..pulses.len() {
        let (a, b) = (pulses[j - 1], pulses[j]);
        let spacing = b - a;

        while change_idx < changes.len() && changes[change_idx] <= a {
            change_idx += 1;
        }
        let mode_change = change_idx < changes.len() && changes[change_idx] <= b;

        let kind = if spacing > base_threshold && shadows.iter().any(|s| s.overlaps(a, b)) {
            Some(BreakKind::EclipseGap)
        } else if spacing > ordinary_threshold {
            Some(BreakKind::Gap)
        } else if mode_change {
            Some(BreakKind::ModeChange)
        } else {
            None
        };

        match kind {
            Some(kind) => {
                runs.push(current);
                current = PulseRun {
                    first: j,
                    last: j,
                    leading: Some(RunBreak {
                        kind,
                        width: spacing,
                    }),
                };
            }
            None => current.last = j,
        }
    }
    runs.push(current);

    merge_single_pulse_runs(runs, level.bridges_eclipses())
}

/// Times at which the onboard spin period jumps by more than `tolerance` (relative).
pub fn mode_change_times(onboard: &[OnboardSpinSample], tolerance: f64) -> Vec<f64> {
    onboard
        .windows(2)
        .filter_map(|w| {
            let (prev, cur) = (w[0].period, w[1].period);
            if prev > 0.0 && ((cur - prev) / prev).abs() > tolerance {
                Some(w[1].time)
            } else {
                None
            }
        })
        .collect()
}

/// Fold single-pulse runs into a neighbour so each run supports a fit.
///
/// With `keep_eclipse_edges`, a lone pulse is never folded across an eclipse
/// gap: it stays a run of its own when it follows an eclipse gap, or when it
/// follows another boundary and precedes one. The builder then closes the
/// eclipse segment on it, or fits it together with the pulse before its
/// leading boundary.
fn merge_single_pulse_runs(runs: Vec<PulseRun>, keep_eclipse_edges: bool) -> Vec<PulseRun> {
    let mut out: Vec<PulseRun> = Vec::with_capacity(runs.len());
    let mut pending: Option<PulseRun> = None;
    let mut runs = runs.into_iter().peekable();

    while let Some(run) = runs.next() {
        let run = match pending.take() {
            Some(p) => PulseRun {
                first: p.first,
                last: run.last,
                leading: p.leading,
            },
            None => run,
        };
        let eclipse_edge = keep_eclipse_edges && borders_eclipse_gap(&run, runs.peek());
        if run.pulse_count() >= 2 || eclipse_edge {
            out.push(run);
        } else {
            pending = Some(run);
        }
    }

    if let Some(p) = pending {
        match out.last_mut() {
            Some(prev) => prev.last = p.last,
            None => out.push(p),
        }
    }

    out
}

fn is_eclipse_break(brk: Option<RunBreak>) -> bool {
    brk.is_some_and(|b| b.kind == BreakKind::EclipseGap)
}

fn borders_eclipse_gap(run: &PulseRun, next: Option<&PulseRun>) -> bool {
    run.leading.is_some()
        && (is_eclipse_break(run.leading) || next.is_some_and(|n| is_eclipse_break(n.leading)))
}
