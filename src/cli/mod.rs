//! Command-line parsing for the spin model demo binary.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::domain::{CorrectionLevel, TimeRange};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "spin", version, about = "Sun pulse spin model over synthetic telemetry")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build one model and print its summary and segment table.
    Build(BuildArgs),
    /// Interpolate spin phase, period and count at query times.
    Interp(InterpArgs),
    /// Build every correction level (in parallel, through the model cache) and compare.
    Levels(LevelsArgs),
}

/// Synthetic telemetry options.
#[derive(Debug, Args, Clone)]
pub struct TelemetryArgs {
    /// Probe identifier.
    #[arg(short = 'p', long, default_value = "a")]
    pub probe: String,

    /// Random seed for telemetry generation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Start of the generated interval (s since epoch).
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Length of the generated interval (s).
    #[arg(long, default_value_t = 10800.0)]
    pub duration: f64,

    /// True spin period at the start (s).
    #[arg(long, default_value_t = 3.0)]
    pub spin_period: f64,

    /// Spin period change per second (s/s).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub period_drift: f64,

    /// Pulse timing jitter, standard deviation (s).
    #[arg(long, default_value_t = 2e-4)]
    pub jitter: f64,

    /// Probability of dropping a single pulse.
    #[arg(long, default_value_t = 0.01)]
    pub dropout: f64,

    /// Telemetry gap as START:END (repeatable).
    #[arg(long, value_parser = parse_range)]
    pub gap: Vec<TimeRange>,

    /// Eclipse window as START:END (repeatable).
    #[arg(long, value_parser = parse_range, default_value = "3600:5400")]
    pub eclipse: Vec<TimeRange>,

    /// Generate without any eclipse window.
    #[arg(long)]
    pub no_eclipse: bool,

    /// True spin period multiplier while in shadow.
    #[arg(long, default_value_t = 1.0005)]
    pub eclipse_factor: f64,

    /// Onboard spin-period sample spacing (s).
    #[arg(long, default_value_t = 60.0)]
    pub onboard_cadence: f64,

    /// RFC 3339 epoch for printing times as UTC (e.g. 2008-03-01T00:00:00Z).
    #[arg(long, value_parser = parse_epoch)]
    pub epoch: Option<DateTime<Utc>>,
}

/// Segment builder options.
#[derive(Debug, Args, Clone)]
pub struct BuilderArgs {
    /// Minimum pulses in range to build a model.
    #[arg(long, default_value_t = 3)]
    pub min_pulses: usize,

    /// Pulse spacing (s) that forces a segment boundary.
    #[arg(long, default_value_t = 30.0)]
    pub gap_threshold: f64,

    /// Gap threshold multiplier for ordinary gaps at levels >= 1.
    #[arg(long, default_value_t = 4.0)]
    pub relaxed_gap_factor: f64,

    /// Relative onboard period jump treated as a mode change.
    #[arg(long, default_value_t = 0.01)]
    pub mode_change_tolerance: f64,

    /// Phase polynomial degree (1-3).
    #[arg(long, default_value_t = 2)]
    pub degree: u8,

    /// Fit a constant phase offset per segment.
    #[arg(long)]
    pub fit_bias: bool,

    /// Extend the last segment up to this many seconds toward the range end.
    #[arg(long, default_value_t = 0.0)]
    pub max_extrapolation: f64,

    /// Restrict the model to START:END (default: the pulse span).
    #[arg(long, value_parser = parse_range)]
    pub range: Option<TimeRange>,
}

#[derive(Debug, Parser, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,

    /// Correction level (0-3).
    #[arg(short = 'l', long, value_parser = parse_level, default_value = "3")]
    pub level: CorrectionLevel,

    /// Print segment columns as JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct InterpArgs {
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,

    /// Correction level (0-3).
    #[arg(short = 'l', long, value_parser = parse_level, default_value = "3")]
    pub level: CorrectionLevel,

    /// Query every STEP seconds across the modeled range.
    #[arg(long, conflicts_with = "times")]
    pub step: Option<f64>,

    /// Explicit query times, comma separated.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub times: Vec<f64>,

    /// Print the interpolation series as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct LevelsArgs {
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,

    /// Print the comparison as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

fn parse_level(s: &str) -> Result<CorrectionLevel, String> {
    let level: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("expected a correction level 0-3, got '{s}'"))?;
    CorrectionLevel::try_from(level).map_err(|e| e.to_string())
}

fn parse_range(s: &str) -> Result<TimeRange, String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{s}'"))?;
    let start: f64 = a.trim().parse().map_err(|_| format!("bad start time '{a}'"))?;
    let end: f64 = b.trim().parse().map_err(|_| format!("bad end time '{b}'"))?;
    TimeRange::new(start, end).map_err(|e| e.to_string())
}

fn parse_epoch(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad RFC 3339 epoch '{s}': {e}"))
}
