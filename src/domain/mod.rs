//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - input types (`SpinTelemetry`, `OnboardSpinSample`, `TimeRange`)
//! - builder configuration (`BuilderConfig`, `PhaseFit`, `CorrectionLevel`)
//! - model outputs (`Segment`, `SegmentFlags`, `InterpolationResult`)

pub mod types;

pub use types::*;
