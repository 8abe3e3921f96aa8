//! Small dense linear-algebra helpers (pure Rust, no BLAS).
//!
//! Only what the connectivity estimator needs: a Cholesky factorisation and
//! the inverse of a symmetric positive-definite matrix built from it.
use ndarray::Array2;

use crate::error::{Error, Result};

/// Lower-triangular `L` with `a = L · Lᵀ`.
///
/// Only the lower triangle of `a` is read. Fails with
/// [`Error::SingularCovariance`] on the first non-positive pivot.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "cholesky requires a square matrix");
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut d = a[[j, j]];
        for k in 0..j {
            d -= l[[j, k]] * l[[j, k]];
        }
        if d <= 0.0 || !d.is_finite() {
            return Err(Error::SingularCovariance { pivot: j });
        }
        let d = d.sqrt();
        l[[j, j]] = d;
        for i in j + 1..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / d;
        }
    }
    Ok(l)
}

/// Inverse of a symmetric positive-definite matrix.
///
/// Solves `L Lᵀ X = I` column by column; the result is symmetrised so that
/// `x[i, j] == x[j, i]` bit for bit.
pub fn spd_inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky(a)?;
    let mut inv = Array2::<f64>::zeros((n, n));
    let mut y = vec![0.0; n];
    for col in 0..n {
        // Forward: L y = e_col
        for i in 0..n {
            let mut s = if i == col { 1.0 } else { 0.0 };
            for k in 0..i {
                s -= l[[i, k]] * y[k];
            }
            y[i] = s / l[[i, i]];
        }
        // Backward: Lᵀ x = y
        for i in (0..n).rev() {
            let mut s = y[i];
            for k in i + 1..n {
                s -= l[[k, i]] * inv[[k, col]];
            }
            inv[[i, col]] = s / l[[i, i]];
        }
    }
    for i in 0..n {
        for j in i + 1..n {
            let m = 0.5 * (inv[[i, j]] + inv[[j, i]]);
            inv[[i, j]] = m;
            inv[[j, i]] = m;
        }
    }
    Ok(inv)
}
