//! Segment fitting orchestration.
//!
//! Responsibilities:
//!
//! - split sun pulses into runs at gaps, eclipses and onboard mode changes
//! - number revolutions and fit each run's phase polynomial
//! - apply the correction strategy across eclipse gaps

pub mod builder;
pub mod fitter;
pub mod partition;

pub use builder::*;
pub use fitter::*;
pub use partition::*;
