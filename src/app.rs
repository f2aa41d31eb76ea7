//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initialises logging
//! - parses CLI arguments
//! - generates synthetic telemetry
//! - builds spin models through the cache
//! - prints tables or JSON

use clap::Parser;
use serde_json::json;

use crate::cli::{BuildArgs, BuilderArgs, Command, InterpArgs, LevelsArgs, TelemetryArgs};
use crate::data::SampleConfig;
use crate::domain::{BuilderConfig, PhaseFit, ProbeId};
use crate::error::AppError;
use crate::models::SpinModelCache;

pub mod pipeline;

use pipeline::RunConfig;

/// Default spacing (s) of `spin interp` queries when neither `--step` nor `--times` is given.
const DEFAULT_INTERP_STEP: f64 = 60.0;

/// Entry point for the `spin` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Build(args) => handle_build(args),
        Command::Interp(args) => handle_interp(args),
        Command::Levels(args) => handle_levels(args),
    }
}

fn init_logging() {
    // RUST_LOG overrides the default.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn handle_build(args: BuildArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args.telemetry, &args.builder);
    let sample = pipeline::generate(&config)?;
    let cache = SpinModelCache::new();
    let run = pipeline::run_level(&config, &sample, args.level, &cache)?;

    if args.json {
        let value = json!({
            "summary": run.summary,
            "truth": run.truth,
            "segments": run.model.segment_columns(),
        });
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!(
        "{}",
        crate::report::format_model_summary(&run.model, &run.summary, config.epoch)
    );
    println!("{}", crate::report::format_segment_table(&run.model));
    Ok(())
}

fn handle_interp(args: InterpArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args.telemetry, &args.builder);
    let sample = pipeline::generate(&config)?;
    let cache = SpinModelCache::new();
    let run = pipeline::run_level(&config, &sample, args.level, &cache)?;

    let times = if args.times.is_empty() {
        let step = args.step.unwrap_or(DEFAULT_INTERP_STEP);
        if !(step.is_finite() && step > 0.0) {
            return Err(AppError::new(2, format!("--step must be > 0, got {step}")));
        }
        let (start, end) = run.model.get_timerange();
        query_grid(start, end, step)
    } else {
        args.times.clone()
    };

    let series = run.model.interp_series(&times)?;

    if args.json {
        println!("{}", to_json(&series)?);
        return Ok(());
    }

    println!(
        "{}",
        crate::report::format_model_summary(&run.model, &run.summary, config.epoch)
    );
    println!("{}", crate::report::format_interp_table(&series, config.epoch));
    Ok(())
}

fn handle_levels(args: LevelsArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args.telemetry, &args.builder);
    let sample = pipeline::generate(&config)?;
    let cache = SpinModelCache::new();
    let runs = pipeline::run_all_levels(&config, &sample, &cache)?;

    let rows: Vec<_> = runs
        .into_iter()
        .map(|run| (run.summary, run.truth))
        .collect();

    if args.json {
        let value: Vec<_> = rows
            .iter()
            .map(|(summary, truth)| json!({ "summary": summary, "truth": truth }))
            .collect();
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!("Probe: {} | pulses: {}", config.probe, sample.telemetry.sun_pulse_times.len());
    println!("{}", crate::report::format_level_comparison(&rows));
    Ok(())
}

pub fn run_config_from_args(telemetry: &TelemetryArgs, builder: &BuilderArgs) -> RunConfig {
    RunConfig {
        probe: ProbeId::new(telemetry.probe.clone()),
        sample: SampleConfig {
            seed: telemetry.seed,
            start: telemetry.start,
            duration: telemetry.duration,
            spin_period: telemetry.spin_period,
            period_drift: telemetry.period_drift,
            jitter: telemetry.jitter,
            dropout_probability: telemetry.dropout,
            gaps: telemetry.gap.clone(),
            eclipses: if telemetry.no_eclipse {
                Vec::new()
            } else {
                telemetry.eclipse.clone()
            },
            eclipse_period_factor: telemetry.eclipse_factor,
            onboard_cadence: telemetry.onboard_cadence,
        },
        builder: BuilderConfig {
            min_pulses: builder.min_pulses,
            gap_threshold: builder.gap_threshold,
            relaxed_gap_factor: builder.relaxed_gap_factor,
            mode_change_tolerance: builder.mode_change_tolerance,
            phase_fit: PhaseFit {
                degree: builder.degree,
                fit_bias: builder.fit_bias,
            },
            max_extrapolation: builder.max_extrapolation,
        },
        range: builder.range,
        epoch: telemetry.epoch,
    }
}

fn query_grid(start: f64, end: f64, step: f64) -> Vec<f64> {
    let n = ((end - start) / step).floor() as usize;
    let mut times: Vec<f64> = (0..=n).map(|i| start + step * i as f64).collect();
    if times.last().is_some_and(|&t| t < end) {
        times.push(end);
    }
    times
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::new(1, format!("JSON serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::CorrectionLevel;

    #[test]
    fn query_grid_covers_range_end() {
        assert_eq!(query_grid(0.0, 10.0, 5.0), vec![0.0, 5.0, 10.0]);
        assert_eq!(query_grid(0.0, 11.0, 5.0), vec![0.0, 5.0, 10.0, 11.0]);
    }

    #[test]
    fn args_map_onto_configs() {
        let cli = Cli::try_parse_from([
            "spin",
            "build",
            "--level",
            "2",
            "--no-eclipse",
            "--gap",
            "100:200",
            "--degree",
            "3",
            "--range",
            "0:5000",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.level, CorrectionLevel::EclipseModelSubstitution);

        let config = run_config_from_args(&args.telemetry, &args.builder);
        assert!(config.sample.eclipses.is_empty());
        assert_eq!(config.sample.gaps.len(), 1);
        assert_eq!(config.builder.phase_fit.degree, 3);
        assert!(config.builder.validate().is_ok());
        assert_eq!(config.range.map(|r| r.end), Some(5000.0));
        assert_eq!(config.probe.as_str(), "a");
    }
}
