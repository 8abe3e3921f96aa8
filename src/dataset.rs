//! Per-dataset metadata: time-series file naming and gender encoding.
//!
//! Each supported cohort ships its ROI time series under a fixed file naming
//! convention. The table below is the only place those conventions live; a
//! dataset missing from it is an [`Error::UnsupportedDataset`].
use crate::error::{Error, Result};

/// How a cohort writes the gender column of its phenotype table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderEncoding {
    /// Numeric code, possibly written as a float (`"1.0"`); truncated.
    Numeric,
    /// The given token maps to 0, any other value to 1.
    Token(&'static str),
}

/// Naming and encoding rules for one cohort.
#[derive(Clone, Copy)]
pub struct DatasetSpec {
    /// Canonical dataset name.
    pub name: &'static str,
    file_name: fn(&str) -> Option<String>,
    pub gender: GenderEncoding,
}

const DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "adhd200",
        file_name: adhd200_file,
        gender: GenderEncoding::Numeric,
    },
    DatasetSpec {
        name: "cobre",
        file_name: cobre_file,
        gender: GenderEncoding::Token("male"),
    },
    DatasetSpec {
        name: "UCLA",
        file_name: ucla_file,
        gender: GenderEncoding::Token("M"),
    },
    DatasetSpec {
        name: "hcp-ep",
        file_name: hcp_ep_file,
        gender: GenderEncoding::Token("M"),
    },
];

fn adhd200_file(id: &str) -> Option<String> {
    let n: u64 = id.trim().parse().ok()?;
    Some(format!("fmri_X_{n:07}_session_1_run1.nii_aal3.npy"))
}

fn cobre_file(id: &str) -> Option<String> {
    Some(format!(
        "sub-{id}_ses-20110101_task-rest_space-MNI152NLin2009cAsym_desc-preproc_bold.nii_aal3.npy"
    ))
}

fn ucla_file(id: &str) -> Option<String> {
    Some(format!("{id}_task-rest_bold_space-MNI152NLin2009cAsym_preproc.nii_ho.npy"))
}

fn hcp_ep_file(id: &str) -> Option<String> {
    Some(format!(
        "sub-{id}_task-rest_acq-pa_run-1_space-MNI152NLin2009cAsym_desc-preproc_bold.nii_aal3.npy"
    ))
}

impl std::fmt::Debug for DatasetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSpec")
            .field("name", &self.name)
            .field("gender", &self.gender)
            .finish_non_exhaustive()
    }
}

impl DatasetSpec {
    /// Case-insensitive lookup by dataset name.
    pub fn lookup(name: &str) -> Result<&'static DatasetSpec> {
        DATASETS
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnsupportedDataset(name.to_string()))
    }

    /// Names of every supported dataset, in table order.
    pub fn supported() -> impl Iterator<Item = &'static str> {
        DATASETS.iter().map(|d| d.name)
    }

    /// Time-series file name for `subject` under this dataset's convention.
    pub fn timeseries_file(&self, subject: &str) -> Result<String> {
        (self.file_name)(subject).ok_or_else(|| Error::InvalidSubjectId {
            id: subject.to_string(),
            dataset: self.name.to_string(),
        })
    }
}
