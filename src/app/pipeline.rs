//! Shared model pipeline used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! synthetic telemetry -> cached model build -> summary -> truth comparison
//!
//! The subcommands can then focus on presentation (tables vs JSON).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::data::{generate_telemetry, SampleConfig, SyntheticTelemetry};
use crate::domain::{BuilderConfig, CorrectionLevel, ProbeId, TimeRange};
use crate::error::AppError;
use crate::models::{SpinModel, SpinModelCache};
use crate::report::{compare_to_truth, summarize_model, ModelSummary, TruthComparison};

/// Resolved run configuration (CLI flags mapped onto library configs).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub probe: ProbeId,
    pub sample: SampleConfig,
    pub builder: BuilderConfig,
    pub range: Option<TimeRange>,
    pub epoch: Option<DateTime<Utc>>,
}

/// One built model with its diagnostics.
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub model: Arc<SpinModel>,
    pub summary: ModelSummary,
    pub truth: Option<TruthComparison>,
}

pub fn generate(config: &RunConfig) -> Result<SyntheticTelemetry, AppError> {
    Ok(generate_telemetry(&config.sample)?)
}

/// Build (or fetch) the model for one level and compute its diagnostics.
pub fn run_level(
    config: &RunConfig,
    sample: &SyntheticTelemetry,
    level: CorrectionLevel,
    cache: &SpinModelCache,
) -> Result<ModelRun, AppError> {
    let model = cache.get_or_build_from(
        &config.probe,
        level,
        &sample.telemetry,
        config.range,
        &config.builder,
    )?;
    let summary = summarize_model(&model)?;
    let truth = compare_to_truth(&model, &sample.true_pulse_times);
    Ok(ModelRun {
        model,
        summary,
        truth,
    })
}

/// Build every correction level in parallel through one cache.
pub fn run_all_levels(
    config: &RunConfig,
    sample: &SyntheticTelemetry,
    cache: &SpinModelCache,
) -> Result<Vec<ModelRun>, AppError> {
    CorrectionLevel::ALL
        .par_iter()
        .map(|&level| run_level(config, sample, level, cache))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            probe: ProbeId::new("a"),
            sample: SampleConfig {
                duration: 2.0 * 3600.0,
                eclipses: vec![TimeRange::new(2400.0, 3600.0).unwrap()],
                ..SampleConfig::default()
            },
            builder: BuilderConfig::default(),
            range: None,
            epoch: None,
        }
    }

    #[test]
    fn all_levels_build_through_the_cache() {
        let cfg = config();
        let sample = generate(&cfg).unwrap();
        let cache = SpinModelCache::new();
        let runs = run_all_levels(&cfg, &sample, &cache).unwrap();

        assert_eq!(runs.len(), 4);
        assert_eq!(cache.len(), 4);
        for (run, level) in runs.iter().zip(CorrectionLevel::ALL) {
            assert_eq!(run.summary.level, level);
            let cached = cache.get(&cfg.probe, level).unwrap();
            assert!(Arc::ptr_eq(&run.model, &cached));
        }
        // Dedicated eclipse segment at levels >= 1.
        assert!(runs[1].summary.segments > runs[0].summary.segments);
        assert!(runs.iter().all(|r| r.summary.eclipse_intervals == 1));
    }

    #[test]
    fn onboard_substitution_beats_continuation_in_shadow() {
        let cfg = config();
        let sample = generate(&cfg).unwrap();
        let cache = SpinModelCache::new();
        let continuation =
            run_level(&cfg, &sample, CorrectionLevel::GapInterpolation, &cache).unwrap();
        let substituted =
            run_level(&cfg, &sample, CorrectionLevel::EclipseModelSubstitution, &cache).unwrap();

        let in_shadow: Vec<f64> = sample
            .true_pulse_times
            .iter()
            .copied()
            .filter(|t| *t > 2400.0 && *t < 3600.0)
            .collect();
        let worst = |run: &ModelRun| {
            compare_to_truth(&run.model, &in_shadow)
                .map(|c| c.max_abs_phase_error)
                .unwrap()
        };
        assert!(worst(&substituted) < worst(&continuation));
    }
}
