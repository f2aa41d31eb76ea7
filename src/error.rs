//! Error types.
//!
//! - `SpinModelError` is the library error: every failure of building or
//!   querying a spin model, with enough context (probe, level, time range,
//!   segment index) to diagnose it.
//! - `AppError` is the binary's error: a message plus the process exit code.

use thiserror::Error;

use crate::domain::{CorrectionLevel, ProbeId};

/// Errors raised while building or querying a spin model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpinModelError {
    #[error(
        "insufficient data for probe {probe} ({level}): {found} pulses in [{start}, {end}], need at least {required}"
    )]
    InsufficientData {
        probe: ProbeId,
        level: CorrectionLevel,
        start: f64,
        end: f64,
        found: usize,
        required: usize,
    },

    #[error("time {t} outside modeled range [{start}, {end}] for probe {probe} ({level})")]
    OutOfRange {
        probe: ProbeId,
        level: CorrectionLevel,
        t: f64,
        start: f64,
        end: f64,
    },

    #[error(
        "degenerate fit for probe {probe} ({level}) in segment {segment_index} [{start}, {end}]: {reason}"
    )]
    DegenerateFit {
        probe: ProbeId,
        level: CorrectionLevel,
        segment_index: usize,
        start: f64,
        end: f64,
        reason: String,
    },

    #[error("invalid telemetry: {0}")]
    InvalidTelemetry(String),

    #[error("invalid builder configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid segment sequence: {0}")]
    InvalidSegments(String),

    #[error("unknown correction level {0} (expected 0-3)")]
    InvalidCorrectionLevel(u8),
}

pub type Result<T, E = SpinModelError> = std::result::Result<T, E>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<SpinModelError> for AppError {
    fn from(err: SpinModelError) -> Self {
        let exit_code = match err {
            SpinModelError::InvalidTelemetry(_)
            | SpinModelError::InvalidConfig(_)
            | SpinModelError::InvalidSegments(_)
            | SpinModelError::InvalidCorrectionLevel(_) => 2,
            SpinModelError::InsufficientData { .. } => 3,
            SpinModelError::DegenerateFit { .. } => 4,
            SpinModelError::OutOfRange { .. } => 5,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_exit_codes_follow_error_kind() {
        let probe = ProbeId::new("a");
        let insufficient = SpinModelError::InsufficientData {
            probe: probe.clone(),
            level: CorrectionLevel::NoCorrection,
            start: 0.0,
            end: 1.0,
            found: 1,
            required: 3,
        };
        assert_eq!(AppError::from(insufficient).exit_code(), 3);

        let out_of_range = SpinModelError::OutOfRange {
            probe,
            level: CorrectionLevel::GapInterpolation,
            t: -1.0,
            start: 0.0,
            end: 1.0,
        };
        let app = AppError::from(out_of_range);
        assert_eq!(app.exit_code(), 5);
        assert!(app.to_string().contains("outside modeled range"));

        assert_eq!(AppError::from(SpinModelError::InvalidCorrectionLevel(9)).exit_code(), 2);
    }
}
