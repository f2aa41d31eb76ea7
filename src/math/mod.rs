//! Mathematical utilities: least squares and phase arithmetic.

pub mod ols;
pub mod phase;

pub use ols::*;
pub use phase::*;
