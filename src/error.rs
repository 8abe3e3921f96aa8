//! Error taxonomy for the connectivity pipeline.
//!
//! Tolerated conditions (missing time-series file, unparsable phenotype field)
//! never surface here; they are handled in place by the loaders. Everything
//! below aborts the running stage.
use std::path::PathBuf;

/// Errors produced by the pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dataset name has no entry in the naming table.
    #[error("unsupported dataset: {0}")]
    UnsupportedDataset(String),

    /// Score field not covered by the phenotype encoding rules.
    #[error("unsupported score field: {0}")]
    UnsupportedScore(String),

    /// Connectivity kind other than `correlation` / `partial correlation`.
    #[error("unsupported connectivity kind: {0}")]
    UnsupportedKind(String),

    /// Subject ID that cannot be rendered into the dataset's file template.
    #[error("invalid subject id {id:?} for dataset {dataset}")]
    InvalidSubjectId { id: String, dataset: String },

    /// A valid subject has no persisted connectivity matrix.
    #[error("connectivity matrix not found: {}", .path.display())]
    MissingConnectivity { path: PathBuf },

    /// Time series in the cohort disagree on the region axis.
    #[error("subject {subject}: expected {expected} regions, found {found}")]
    RegionMismatch {
        subject: String,
        expected: usize,
        found: usize,
    },

    /// Parallel inputs (series, matrices, subject IDs) of different lengths.
    #[error("{what}: expected {expected} entries, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Nothing to fit.
    #[error("connectivity estimator needs at least one time series")]
    EmptyCohort,

    /// A series too short to estimate a covariance from.
    #[error("subject {subject}: {found} time points, need at least 2")]
    TooFewTimepoints { subject: String, found: usize },

    /// Covariance could not be inverted for partial correlation.
    #[error("covariance matrix is not positive definite (pivot {pivot})")]
    SingularCovariance { pivot: usize },

    /// Malformed on-disk data (npy / safetensors header, dtype, shape).
    #[error("{}: {msg}", .path.display())]
    Format { path: PathBuf, msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn format(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Error::Format { path: path.into(), msg: msg.into() }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
