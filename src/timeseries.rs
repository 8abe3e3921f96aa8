//! Time-series loader.
//!
//! For every subject the dataset's naming template gives the `.npy` file under
//! `<data_root>/<dataset>_roi/`. Files are stored regions × time and are
//! transposed on load to `[T, R]`. Subjects without a file are dropped.
use log::{debug, info};
use ndarray::Array2;

use crate::config::PipelineConfig;
use crate::dataset::DatasetSpec;
use crate::error::Result;
use crate::io::read_npy;

/// Loaded time series with their subject IDs, index for index.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesSet {
    /// `[T, R]` per subject; `T` may differ between subjects.
    pub series: Vec<Array2<f64>>,
    /// Subjects whose file was found, in input order.
    pub subjects: Vec<String>,
}

impl TimeSeriesSet {
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// Load the time series of every subject in `subjects` that has a file.
///
/// Fails with [`crate::Error::UnsupportedDataset`] before touching the disk if
/// `cfg.dataset` has no naming template.
pub fn get_timeseries(subjects: &[String], cfg: &PipelineConfig) -> Result<TimeSeriesSet> {
    let spec = DatasetSpec::lookup(&cfg.dataset)?;
    let folder = cfg.roi_dir();
    info!("loading time series from {}", folder.display());

    let mut out = TimeSeriesSet::default();
    for subject in subjects {
        let path = folder.join(spec.timeseries_file(subject)?);
        if !path.exists() {
            debug!("{subject}: no time series at {}, skipped", path.display());
            continue;
        }
        let data = read_npy(&path)?;
        out.series.push(data.t().as_standard_layout().into_owned());
        out.subjects.push(subject.clone());
    }
    info!("{} of {} subjects have time series", out.len(), subjects.len());
    Ok(out)
}
