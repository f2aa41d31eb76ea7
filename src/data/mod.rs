//! Telemetry sources.

pub mod sample;

pub use sample::*;
