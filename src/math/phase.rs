//! Phase arithmetic in degrees.
//!
//! Numerical notes:
//! - `rem_euclid` can return exactly `360.0` for tiny negative inputs
//!   (e.g. `-1e-17`), so results are folded back into `[0, 360)`.
//! - Phase differences are reported in `(-180, 180]` so a slip of a few
//!   degrees never shows up as ~360.

pub const FULL_TURN: f64 = 360.0;

/// Wrap an angle into `[0, 360)`.
pub fn wrap_360(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// Wrap an angle into `(-180, 180]`.
pub fn wrap_180(phase: f64) -> f64 {
    let wrapped = wrap_360(phase);
    if wrapped > 180.0 {
        wrapped - FULL_TURN
    } else {
        wrapped
    }
}

/// Median of a slice (sorted copy); `None` when empty or non-finite values only.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 1 {
        Some(finite[mid])
    } else {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    }
}
