//! # fcprep — functional-connectivity features for fMRI cohorts
//!
//! `fcprep` turns precomputed ROI time series into per-subject connectivity
//! feature records for graph / ML diagnosis models (ABIDE-style cohorts such
//! as ADHD-200, COBRE, UCLA, HCP-EP). The estimator reproduces
//! `nilearn.connectome.ConnectivityMeasure` (Ledoit–Wolf covariance) in pure
//! Rust: no Python, no BLAS.
//!
//! ## Pipeline overview
//!
//! ```text
//! <dataset>-rest.csv
//!   │
//!   ├─ registry::load_subject_ids     subject IDs (column 0)
//!   ├─ timeseries::get_timeseries     <dataset>_roi/*.npy → [T, R], missing files skipped
//!   ├─ connectivity                   fit once over the cohort, transform per subject
//!   │     └─→ <subject>/<subject>_<atlas>_{correlation,partial_correlation}.safetensors
//!   │                                 valid_subject_list.json
//!   │
//!   ├─ phenotype::get_subject_score   DX / Gender / Age per subject (None if unusable)
//!   ├─ features::get_networks         reload, atanh, stack → [S, R, R]
//!   └─ features::save_records         raw/<subject>.safetensors  {corr, pcorr, label}
//! ```
//!
//! The two halves are exposed as [`fetch`] and [`process`] and wrapped by the
//! `fetch_data` and `process_data` binaries.
//!
//! ## Quick start
//!
//! ```no_run
//! use fcprep::{fetch, process, PipelineConfig, Score};
//!
//! let cfg = PipelineConfig {
//!     dataset: "cobre".into(),
//!     ..PipelineConfig::default()
//! };
//! let valid = fetch(&cfg).unwrap();
//! println!("{} subjects with time series", valid.len());
//!
//! let score: Score = "DX".parse().unwrap();
//! let records = process(&cfg, &score).unwrap();
//! println!("{} records written", records.len());
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use fcprep::connectivity::{ConnectivityKind, ConnectivityMeasure};
//! use ndarray::Array2;
//!
//! // four subjects, 200 time points × 116 regions each
//! let cohort: Vec<Array2<f64>> = (0..4)
//!     .map(|k| Array2::from_shape_fn((200, 116), |(t, r)| ((t * (r + k + 1)) as f64).sin()))
//!     .collect();
//! let fitted = ConnectivityMeasure::new(ConnectivityKind::PartialCorrelation)
//!     .fit(&cohort)
//!     .unwrap();
//! let m = fitted.transform(&cohort[0]).unwrap(); // [116, 116]
//! ```

pub mod config;
pub mod connectivity;
pub mod dataset;
pub mod error;
pub mod features;
pub mod io;
pub mod linalg;
pub mod phenotype;
pub mod registry;
pub mod timeseries;

use log::info;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use config::{connectivity_path, PipelineConfig};
pub use connectivity::{
    subject_connectivity, ConnectivityKind, ConnectivityMeasure, FittedConnectivity,
};
pub use dataset::{DatasetSpec, GenderEncoding};
pub use error::{Error, Result};
pub use features::{
    assemble_records, fisher_z_inplace, get_networks, load_connectivity, save_records,
    SubjectRecord,
};
pub use phenotype::{get_subject_score, Score, ScoreField};
pub use registry::load_subject_ids;
pub use timeseries::{get_timeseries, TimeSeriesSet};

/// Stage 1: subject list → time series → connectivity files.
///
/// 1. Read subject IDs from the subject table.
/// 2. Load every available time series (subjects without one are dropped).
/// 3. For each kind (`correlation`, `partial correlation`) fit one estimator
///    over the cohort and write each subject's matrix under
///    [`PipelineConfig::save_dir`].
/// 4. Write the valid subject list to [`PipelineConfig::valid_subjects_path`].
///
/// Returns the valid subject IDs.
///
/// # Errors
///
/// Unsupported dataset, unreadable inputs, an empty or inconsistent cohort,
/// a singular covariance, or any write failure. Files written before the
/// failure are left in place; re-running overwrites them.
pub fn fetch(cfg: &PipelineConfig) -> Result<Vec<String>> {
    let ids = load_subject_ids(cfg)?;
    let set = get_timeseries(&ids, cfg)?;

    let save_dir = cfg.save_dir();
    for kind in ConnectivityKind::ALL {
        subject_connectivity(&set.series, &set.subjects, &cfg.atlas, kind, &save_dir)?;
    }

    let list = cfg.valid_subjects_path();
    io::write_subject_list(&list, &set.subjects)?;
    info!("valid subject list → {}", list.display());
    Ok(set.subjects)
}

/// Stage 2: valid subjects → labels + Fisher-z networks → records.
///
/// Reads the list written by [`fetch`], loads `score` labels, reloads and
/// transforms both connectivity kinds, and writes one record per subject
/// under [`PipelineConfig::raw_dir`].
///
/// # Errors
///
/// Missing hand-off list, unsupported score / dataset, or a valid subject
/// whose connectivity file is missing ([`Error::MissingConnectivity`]).
pub fn process(cfg: &PipelineConfig, score: &Score) -> Result<Vec<SubjectRecord>> {
    let subjects = io::read_subject_list(&cfg.valid_subjects_path())?;
    let labels = get_subject_score(&subjects, cfg, score)?;

    let save_dir = cfg.save_dir();
    let corr = get_networks(&save_dir, &subjects, ConnectivityKind::Correlation, &cfg.atlas)?;
    let pcorr =
        get_networks(&save_dir, &subjects, ConnectivityKind::PartialCorrelation, &cfg.atlas)?;

    let records = assemble_records(&subjects, &corr, &pcorr, &labels)?;
    save_records(&records, &cfg.raw_dir())?;
    Ok(records)
}
