//! `spin-model` library crate.
//!
//! Recovers spacecraft spin phase, period and revolution count from sparse sun
//! pulse telemetry, with per-level strategies for eclipse seasons.
//!
//! The binary (`spin`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - ingestion layers can build and cache models directly

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;

pub use domain::{
    BuilderConfig, CorrectionLevel, InterpolationResult, OnboardSpinSample, PhaseFit, ProbeId,
    Segment, SegmentFlags, SpinTelemetry, TimeRange,
};
pub use error::{Result, SpinModelError};
pub use models::{build_spin_model, InterpolationSeries, SegmentColumns, SpinModel, SpinModelCache};
