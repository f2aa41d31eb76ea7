//! Least squares solver.
//!
//! Each segment fit is a small linear regression of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - SVD, so tall design matrices (many pulses, 1–4 columns) solve robustly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - A rank check relative to the largest singular value. A rank-deficient
//!   system (duplicate timestamps, too few distinct points) is rejected rather
//!   than solved in the minimum-norm sense, so callers never receive an
//!   unstable model.

use nalgebra::{DMatrix, DVector};

/// Relative singular-value cutoff for the rank check.
const RANK_RTOL: f64 = 1e-12;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the design matrix is rank deficient or the solution is
/// not finite.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() < x.ncols() || x.nrows() != y.len() || x.ncols() == 0 {
        return None;
    }

    let svd = x.clone().svd(true, true);
    let sv_max = svd.singular_values.max();
    if !(sv_max.is_finite() && sv_max > 0.0) {
        return None;
    }
    let eps = sv_max * RANK_RTOL;
    if svd.rank(eps) < x.ncols() {
        return None;
    }

    let beta = svd.solve(y, eps).ok()?;
    if beta.iter().all(|v| v.is_finite()) {
        Some(beta)
    } else {
        None
    }
}
