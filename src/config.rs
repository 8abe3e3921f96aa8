//! Pipeline configuration.
//!
//! [`PipelineConfig`] carries every path and name the stages need. Nothing is
//! read from module-level state, so each stage can be pointed at a scratch
//! directory in tests.
use std::path::{Path, PathBuf};

use crate::connectivity::ConnectivityKind;

/// Configuration shared by both pipeline stages.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use fcprep::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     dataset: "cobre".into(),
///     atlas:   "cc200".into(),
///     ..PipelineConfig::default()
/// };
/// assert!(cfg.save_dir().ends_with("cobre_roi/braingnn_cc200"));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding `<dataset>-rest.csv` and `<dataset>_roi/` inputs.
    ///
    /// Default: `data`.
    pub data_root: PathBuf,

    /// Directory under which `<dataset>_roi/braingnn_<atlas>/` outputs go.
    ///
    /// Default: `data`.
    pub dataset_dir: PathBuf,

    /// Dataset name as given by the user (`adhd200`, `cobre`, `UCLA`, `hcp-ep`).
    ///
    /// Default: `adhd200`.
    pub dataset: String,

    /// Parcellation atlas; only used to name output files.
    ///
    /// Default: `aal3`.
    pub atlas: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            dataset_dir: PathBuf::from("data"),
            dataset: "adhd200".into(),
            atlas: "aal3".into(),
        }
    }
}

impl PipelineConfig {
    /// Subject / phenotype table: `<data_root>/<dataset lower-cased>-rest.csv`.
    pub fn phenotype_csv(&self) -> PathBuf {
        self.data_root
            .join(format!("{}-rest.csv", self.dataset.to_lowercase()))
    }

    /// Folder of precomputed time-series arrays: `<data_root>/<dataset>_roi`.
    pub fn roi_dir(&self) -> PathBuf {
        self.data_root.join(format!("{}_roi", self.dataset))
    }

    /// Output folder: `<dataset_dir>/<dataset>_roi/braingnn_<atlas>`.
    pub fn save_dir(&self) -> PathBuf {
        self.dataset_dir
            .join(format!("{}_roi", self.dataset))
            .join(format!("braingnn_{}", self.atlas))
    }

    /// Per-subject record folder: `<save_dir>/raw`.
    pub fn raw_dir(&self) -> PathBuf {
        self.save_dir().join("raw")
    }

    /// Hand-off file between the two stages.
    pub fn valid_subjects_path(&self) -> PathBuf {
        self.save_dir().join("valid_subject_list.json")
    }
}

/// `<save_dir>/<subject>/<subject>_<atlas>_<kind tag>.safetensors`.
///
/// Shared by the writer and the reader so that both agree on the
/// underscore spelling of `partial correlation`.
pub fn connectivity_path(
    save_dir: &Path,
    subject: &str,
    atlas: &str,
    kind: ConnectivityKind,
) -> PathBuf {
    save_dir
        .join(subject)
        .join(format!("{subject}_{atlas}_{}.safetensors", kind.file_tag()))
}
