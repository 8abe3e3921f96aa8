//! Functional connectivity from ROI time series.
//!
//! Matches `nilearn.connectome.ConnectivityMeasure(kind=...)` with its default
//! Ledoit–Wolf covariance estimator:
//!
//! ```text
//! x      [T, R]   one subject's time series
//!   │
//!   ├─ standardize      per region: (x − μ) / σ   (σ with ddof = 0)
//!   ├─ ledoit_wolf      Σ = (1 − s)·S + s·μ_S·I
//!   ├─ correlation      Σ_ij / √(Σ_ii Σ_jj)
//!   └─ partial corr.    P = Σ⁻¹,  −P_ij / √(P_ii P_jj)
//! ```
//!
//! The estimator is fitted once over the whole cohort
//! ([`ConnectivityMeasure::fit`]) and then applied subject by subject
//! ([`FittedConnectivity::transform`]). Both diagonals are exactly 1.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use ndarray::{s, Array2, Array3, Axis};

use crate::config::connectivity_path;
use crate::error::{Error, Result};
use crate::io::StWriter;
use crate::linalg::spd_inverse;

/// Name of the tensor holding the matrix in every connectivity file.
pub const CONNECTIVITY_VAR: &str = "connectivity";

// ── Kind ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityKind {
    Correlation,
    PartialCorrelation,
}

impl ConnectivityKind {
    pub const ALL: [ConnectivityKind; 2] =
        [ConnectivityKind::Correlation, ConnectivityKind::PartialCorrelation];

    /// Human-readable name: `correlation` / `partial correlation`.
    pub fn name(self) -> &'static str {
        match self {
            ConnectivityKind::Correlation => "correlation",
            ConnectivityKind::PartialCorrelation => "partial correlation",
        }
    }

    /// Spelling used in file names (spaces become underscores).
    pub fn file_tag(self) -> &'static str {
        match self {
            ConnectivityKind::Correlation => "correlation",
            ConnectivityKind::PartialCorrelation => "partial_correlation",
        }
    }
}

impl fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectivityKind {
    type Err = Error;

    /// Accepts both the spaced and the underscored spelling.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "correlation" => Ok(ConnectivityKind::Correlation),
            "partial correlation" | "partial_correlation" => {
                Ok(ConnectivityKind::PartialCorrelation)
            }
            other => Err(Error::UnsupportedKind(other.to_string())),
        }
    }
}

// ── Building blocks ──────────────────────────────────────────────────────────

/// Centre every column and scale it to unit population variance.
///
/// Columns whose std is below machine epsilon are only centred.
pub fn standardize(x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows() as f64;
    let mut out = x.to_owned();
    for mut col in out.columns_mut() {
        let mean = col.sum() / n;
        col.mapv_inplace(|v| v - mean);
        let var = col.iter().map(|v| v * v).sum::<f64>() / n;
        let std = var.sqrt();
        if std >= f64::EPSILON {
            col.mapv_inplace(|v| v / std);
        }
    }
    out
}

/// `Xᵀ X / n`, filled from the upper triangle so the result is exactly
/// symmetric.
fn scatter(xc: &Array2<f64>) -> Array2<f64> {
    let (n_samples, n_features) = xc.dim();
    let n = n_samples as f64;
    let mut out = Array2::<f64>::zeros((n_features, n_features));
    for i in 0..n_features {
        let ci = xc.column(i);
        for j in i..n_features {
            let v = ci.dot(&xc.column(j)) / n;
            out[[i, j]] = v;
            out[[j, i]] = v;
        }
    }
    out
}

/// Ledoit–Wolf shrunk covariance of `x` ([T, R]).
///
/// Same estimator as scikit-learn's `LedoitWolf().fit(x)` (data are centred
/// first). Returns `(covariance, shrinkage)`.
pub fn ledoit_wolf(x: &Array2<f64>) -> (Array2<f64>, f64) {
    let n_features = x.ncols();
    let n = x.nrows() as f64;
    let p = n_features as f64;

    let mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| ndarray::Array1::zeros(n_features));
    let xc = x - &mean;
    let emp_cov = scatter(&xc);

    if n_features == 1 {
        return (emp_cov, 0.0);
    }

    let trace: f64 = emp_cov.diag().sum();
    let mu = trace / p;

    // Σ_ij (X²ᵀ X²)_ij = Σ_t (Σ_i x_ti²)²
    let beta_: f64 = xc
        .rows()
        .into_iter()
        .map(|r| {
            let sq: f64 = r.iter().map(|v| v * v).sum();
            sq * sq
        })
        .sum();
    // Σ_ij ((Xᵀ X) / n)_ij²
    let delta_: f64 = emp_cov.iter().map(|v| v * v).sum();

    let beta = (beta_ / n - delta_) / (p * n);
    let delta = (delta_ - 2.0 * mu * trace + p * mu * mu) / p;
    let beta = beta.min(delta);
    let shrinkage = if beta == 0.0 { 0.0 } else { beta / delta };

    let mut cov = emp_cov * (1.0 - shrinkage);
    cov.diag_mut().mapv_inplace(|v| v + shrinkage * mu);
    (cov, shrinkage)
}

/// Normalise a symmetric positive matrix to unit diagonal.
///
/// `out_ij = m_ij / √(m_ii m_jj)`; rows with a zero diagonal yield 0
/// off-diagonal. `sign` flips the off-diagonal (−1 for precision matrices).
fn unit_diagonal(m: &Array2<f64>, sign: f64) -> Array2<f64> {
    let n = m.nrows();
    let d: Vec<f64> = m.diag().iter().map(|v| v.sqrt()).collect();
    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            out[[i, j]] = if i == j {
                1.0
            } else if d[i] > 0.0 && d[j] > 0.0 {
                sign * m[[i, j]] / (d[i] * d[j])
            } else {
                0.0
            };
        }
    }
    out
}

/// Covariance → correlation, diagonal set to 1.
pub fn cov_to_corr(cov: &Array2<f64>) -> Array2<f64> {
    unit_diagonal(cov, 1.0)
}

/// Precision → partial correlation, diagonal set to 1.
pub fn prec_to_partial(prec: &Array2<f64>) -> Array2<f64> {
    unit_diagonal(prec, -1.0)
}

// ── Estimator ────────────────────────────────────────────────────────────────

/// Unfitted connectivity estimator.
#[derive(Debug, Clone)]
pub struct ConnectivityMeasure {
    pub kind: ConnectivityKind,
    /// z-score each region before covariance estimation.
    ///
    /// Default: `true`.
    pub standardize: bool,
}

impl ConnectivityMeasure {
    pub fn new(kind: ConnectivityKind) -> Self {
        Self { kind, standardize: true }
    }

    /// Fit over the whole cohort. Every series must be `[T, R]` with the same
    /// `R` and `T >= 2`.
    pub fn fit(&self, series: &[Array2<f64>]) -> Result<FittedConnectivity> {
        self.fit_named(series, |i| format!("series[{i}]"))
    }

    fn fit_named(
        &self,
        series: &[Array2<f64>],
        name: impl Fn(usize) -> String,
    ) -> Result<FittedConnectivity> {
        let first = series.first().ok_or(Error::EmptyCohort)?;
        let n_regions = first.ncols();
        for (i, ts) in series.iter().enumerate() {
            if ts.ncols() != n_regions {
                return Err(Error::RegionMismatch {
                    subject: name(i),
                    expected: n_regions,
                    found: ts.ncols(),
                });
            }
            if ts.nrows() < 2 {
                return Err(Error::TooFewTimepoints { subject: name(i), found: ts.nrows() });
            }
        }
        Ok(FittedConnectivity {
            kind: self.kind,
            standardize: self.standardize,
            n_regions,
            n_subjects: series.len(),
        })
    }

    /// Fit, then transform every series. Output `[S, R, R]`.
    pub fn fit_transform(&self, series: &[Array2<f64>]) -> Result<Array3<f64>> {
        self.fit(series)?.transform_all(series)
    }
}

/// Connectivity estimator after [`ConnectivityMeasure::fit`].
#[derive(Debug, Clone)]
pub struct FittedConnectivity {
    kind: ConnectivityKind,
    standardize: bool,
    n_regions: usize,
    n_subjects: usize,
}

impl FittedConnectivity {
    pub fn kind(&self) -> ConnectivityKind {
        self.kind
    }

    pub fn n_regions(&self) -> usize {
        self.n_regions
    }

    /// Number of series the estimator was fitted on.
    pub fn n_subjects(&self) -> usize {
        self.n_subjects
    }

    /// Connectivity matrix `[R, R]` of one `[T, R]` series.
    pub fn transform(&self, series: &Array2<f64>) -> Result<Array2<f64>> {
        if series.ncols() != self.n_regions {
            return Err(Error::RegionMismatch {
                subject: "input".into(),
                expected: self.n_regions,
                found: series.ncols(),
            });
        }
        if series.nrows() < 2 {
            return Err(Error::TooFewTimepoints { subject: "input".into(), found: series.nrows() });
        }
        let x = if self.standardize { standardize(series) } else { series.to_owned() };
        let (cov, _) = ledoit_wolf(&x);
        match self.kind {
            ConnectivityKind::Correlation => Ok(cov_to_corr(&cov)),
            ConnectivityKind::PartialCorrelation => Ok(prec_to_partial(&spd_inverse(&cov)?)),
        }
    }

    /// Transform every series, stacked subject-major into `[S, R, R]`.
    pub fn transform_all(&self, series: &[Array2<f64>]) -> Result<Array3<f64>> {
        let r = self.n_regions;
        let mut out = Array3::<f64>::zeros((series.len(), r, r));
        for (i, ts) in series.iter().enumerate() {
            out.slice_mut(s![i, .., ..]).assign(&self.transform(ts)?);
        }
        Ok(out)
    }
}

// ── Stage entry point ────────────────────────────────────────────────────────

/// Compute `kind` connectivity for every subject and persist one file each.
///
/// `series[i]` belongs to `subjects[i]`. The estimator is fitted once across
/// all of them. Each matrix is written to
/// `<save_dir>/<subject>/<subject>_<atlas>_<kind tag>.safetensors` (tensor
/// `connectivity`), overwriting any previous file. Returns the stacked
/// `[S, R, R]` matrices.
pub fn subject_connectivity(
    series: &[Array2<f64>],
    subjects: &[String],
    atlas: &str,
    kind: ConnectivityKind,
    save_dir: &Path,
) -> Result<Array3<f64>> {
    if series.len() != subjects.len() {
        return Err(Error::LengthMismatch {
            what: "time series",
            expected: subjects.len(),
            found: series.len(),
        });
    }
    info!("computing {kind} connectivity for {} subjects", subjects.len());

    let fitted = ConnectivityMeasure::new(kind).fit_named(series, |i| subjects[i].clone())?;
    let matrices = fitted.transform_all(series)?;

    std::fs::create_dir_all(save_dir)?;
    for (i, subject) in subjects.iter().enumerate() {
        let path = connectivity_path(save_dir, subject, atlas, kind);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut w = StWriter::new();
        w.add_f64_arr2(CONNECTIVITY_VAR, &matrices.slice(s![i, .., ..]).to_owned());
        w.write(&path)?;
        debug!("wrote {}", path.display());
    }
    Ok(matrices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_series(t: usize, r: usize, seed: f64) -> Array2<f64> {
        Array2::from_shape_fn((t, r), |(i, j)| {
            let x = i as f64;
            (x * (0.3 + 0.11 * j as f64) + seed).sin() + 0.5 * (x * 0.07 * (j + 1) as f64).cos()
        })
    }

    #[test]
    fn kind_parses_both_spellings() {
        assert_eq!(
            "correlation".parse::<ConnectivityKind>().unwrap(),
            ConnectivityKind::Correlation
        );
        assert_eq!(
            "partial correlation".parse::<ConnectivityKind>().unwrap(),
            ConnectivityKind::PartialCorrelation
        );
        assert_eq!(
            "partial_correlation".parse::<ConnectivityKind>().unwrap(),
            ConnectivityKind::PartialCorrelation
        );
        assert!(matches!("tangent".parse::<ConnectivityKind>(), Err(Error::UnsupportedKind(_))));
    }

    #[test]
    fn standardize_zero_mean_unit_std() {
        let x = toy_series(50, 4, 0.2);
        let z = standardize(&x);
        for col in z.columns() {
            let m = col.sum() / 50.0;
            let v = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / 50.0;
            approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
            approx::assert_abs_diff_eq!(v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn standardize_constant_column_is_centred_only() {
        let x = array![[3.0, 1.0], [3.0, 2.0], [3.0, 4.0]];
        let z = standardize(&x);
        assert!(z.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ledoit_wolf_known_values() {
        let x = array![
            [1.0, 2.0, 0.0],
            [2.0, 1.0, 1.0],
            [0.0, 0.0, -1.0],
            [1.0, 4.0, 2.0],
            [3.0, 2.0, 1.0],
            [0.0, 3.0, 3.0],
        ];
        let (cov, shrinkage) = ledoit_wolf(&x);
        approx::assert_abs_diff_eq!(shrinkage, 0.788_120_445_483_294_6, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(cov[[0, 0]], 1.416_190_527_114_492_6, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(cov[[1, 1]], 1.528_015_847_553_864_8, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(cov[[1, 2]], 0.282_506_072_688_940_46, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(cov[[0, 1]], 0.0, epsilon = 1e-12);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(cov[[i, j]], cov[[j, i]]);
            }
        }
        // Shrinkage preserves the trace.
        let xc = &x - &x.mean_axis(Axis(0)).unwrap();
        let emp = xc.t().dot(&xc) / 6.0;
        approx::assert_abs_diff_eq!(cov.diag().sum(), emp.diag().sum(), epsilon = 1e-12);
    }

    #[test]
    fn ledoit_wolf_single_feature_is_plain_variance() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let (cov, s) = ledoit_wolf(&x);
        assert_eq!(s, 0.0);
        approx::assert_abs_diff_eq!(cov[[0, 0]], 1.25, epsilon = 1e-12);
    }

    #[test]
    fn correlation_unit_diagonal_and_bounded() {
        let x = toy_series(120, 6, 0.0);
        let fitted = ConnectivityMeasure::new(ConnectivityKind::Correlation)
            .fit(std::slice::from_ref(&x))
            .unwrap();
        let c = fitted.transform(&x).unwrap();
        for i in 0..6 {
            assert_eq!(c[[i, i]], 1.0);
            for j in 0..6 {
                assert!(c[[i, j]].abs() <= 1.0);
                assert_eq!(c[[i, j]], c[[j, i]]);
            }
        }
    }

    #[test]
    fn partial_correlation_two_regions_equals_correlation() {
        // With two regions there is nothing to partial out.
        let x = toy_series(80, 2, 1.3);
        let series = vec![x];
        let corr = ConnectivityMeasure::new(ConnectivityKind::Correlation)
            .fit_transform(&series)
            .unwrap();
        let pcorr = ConnectivityMeasure::new(ConnectivityKind::PartialCorrelation)
            .fit_transform(&series)
            .unwrap();
        approx::assert_abs_diff_eq!(corr[[0, 0, 1]], pcorr[[0, 0, 1]], epsilon = 1e-12);
        assert_eq!(pcorr[[0, 1, 1]], 1.0);
    }

    #[test]
    fn fit_rejects_region_mismatch() {
        let series = vec![toy_series(20, 4, 0.0), toy_series(20, 5, 0.0)];
        let err = ConnectivityMeasure::new(ConnectivityKind::Correlation).fit(&series).unwrap_err();
        assert!(matches!(err, Error::RegionMismatch { expected: 4, found: 5, .. }));
    }

    #[test]
    fn fit_rejects_empty_and_short() {
        let m = ConnectivityMeasure::new(ConnectivityKind::Correlation);
        assert!(matches!(m.fit(&[]), Err(Error::EmptyCohort)));
        let short = vec![Array2::<f64>::zeros((1, 3))];
        assert!(matches!(m.fit(&short), Err(Error::TooFewTimepoints { found: 1, .. })));
    }

    #[test]
    fn transform_rejects_wrong_width() {
        let fitted = ConnectivityMeasure::new(ConnectivityKind::PartialCorrelation)
            .fit(&[toy_series(30, 3, 0.0)])
            .unwrap();
        assert_eq!(fitted.n_regions(), 3);
        assert_eq!(fitted.n_subjects(), 1);
        assert!(fitted.transform(&toy_series(30, 4, 0.0)).is_err());
    }

    #[test]
    fn fit_transform_is_deterministic() {
        let series: Vec<_> = (0..3).map(|k| toy_series(60, 5, k as f64)).collect();
        let m = ConnectivityMeasure::new(ConnectivityKind::PartialCorrelation);
        let a = m.fit_transform(&series).unwrap();
        let b = m.fit_transform(&series).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}
