/// Shared helpers for building on-disk cohorts in a scratch directory.
use fcprep::{io::write_npy, DatasetSpec, PipelineConfig};
use ndarray::{Array, Array2, IxDyn};
use std::path::Path;

#[allow(unused)]
/// Config rooted at `root` for both inputs and outputs.
pub fn config_in(root: &Path, dataset: &str) -> PipelineConfig {
    PipelineConfig {
        data_root: root.to_path_buf(),
        dataset_dir: root.join("out"),
        dataset: dataset.into(),
        atlas: "aal3".into(),
    }
}

#[allow(unused)]
/// Deterministic pseudo-signal, `[T, R]`. Regions share a common component
/// so correlations are non-trivial.
pub fn synthetic_series(n_t: usize, n_r: usize, seed: u64) -> Array2<f64> {
    let s = seed as f64;
    Array2::from_shape_fn((n_t, n_r), |(t, r)| {
        let x = t as f64;
        let shared = (x * 0.17 + s).sin();
        let own = (x * (0.23 + 0.071 * r as f64) + 1.3 * s + r as f64).cos();
        let wiggle = ((x + 1.0) * (r as f64 + 2.0) * 0.618 + s).sin() * 0.3;
        0.6 * shared + own + wiggle
    })
}

/// Write `series` (`[T, R]`) the way the cohort stores it: regions × time,
/// under the dataset's file name for `subject`.
#[allow(unused)]
pub fn write_subject_series(cfg: &PipelineConfig, subject: &str, series: &Array2<f64>) {
    let spec = DatasetSpec::lookup(&cfg.dataset).unwrap();
    let dir = cfg.roi_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(spec.timeseries_file(subject).unwrap());
    write_npy(&path, &series.t().to_owned()).unwrap();
}

/// Write the subject / phenotype table.
#[allow(unused)]
pub fn write_table(cfg: &PipelineConfig, body: &str) {
    std::fs::create_dir_all(&cfg.data_root).unwrap();
    std::fs::write(cfg.phenotype_csv(), body).unwrap();
}

#[allow(unused)]
/// Maximum absolute difference between two arrays.
pub fn max_abs_diff(a: &Array<f64, IxDyn>, b: &Array<f64, IxDyn>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0_f64, f64::max)
}
