//! Feature assembly: reload connectivity matrices, Fisher-z them, and merge
//! them with labels into per-subject records.
//!
//! Every subject handed to this stage must already have its matrices on disk;
//! a missing file is a broken pipeline, not a skippable subject.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array2, Array3, Axis};

use crate::config::connectivity_path;
use crate::connectivity::{ConnectivityKind, CONNECTIVITY_VAR};
use crate::error::{Error, Result};
use crate::io::{StFile, StWriter};

/// Element-wise `atanh`, in place.
///
/// Inputs are clamped to `[-1, 1]` first, so exact (or round-off) ±1 maps to
/// ±∞ and the output never contains NaN for finite input. The unit diagonal
/// of a connectivity matrix therefore becomes `+∞`.
pub fn fisher_z_inplace(m: &mut Array2<f64>) {
    m.mapv_inplace(|v| v.clamp(-1.0, 1.0).atanh());
}

/// Load one subject's untransformed connectivity matrix.
pub fn load_connectivity(
    save_dir: &Path,
    subject: &str,
    atlas: &str,
    kind: ConnectivityKind,
) -> Result<Array2<f64>> {
    let path = connectivity_path(save_dir, subject, atlas, kind);
    if !path.exists() {
        return Err(Error::MissingConnectivity { path });
    }
    StFile::load(&path)?
        .get_arr2(CONNECTIVITY_VAR)?
        .ok_or_else(|| Error::format(&path, format!("no '{CONNECTIVITY_VAR}' tensor")))
}

/// Load, Fisher-z and stack every subject's matrix into `[S, R, R]`.
///
/// Subject order is preserved along axis 0.
pub fn get_networks(
    save_dir: &Path,
    subjects: &[String],
    kind: ConnectivityKind,
    atlas: &str,
) -> Result<Array3<f64>> {
    info!("loading {kind} networks for {} subjects", subjects.len());
    let mut mats: Vec<Array2<f64>> = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let mut m = load_connectivity(save_dir, subject, atlas, kind)?;
        if let Some(prev) = mats.first().map(|p| p.dim()) {
            if m.dim() != prev {
                return Err(Error::RegionMismatch {
                    subject: subject.clone(),
                    expected: prev.0,
                    found: m.nrows(),
                });
            }
        }
        fisher_z_inplace(&mut m);
        mats.push(m);
    }

    let (r, c) = mats.first().map_or((0, 0), |m| m.dim());
    let mut out = Array3::<f64>::zeros((mats.len(), r, c));
    for (i, m) in mats.iter().enumerate() {
        out.slice_mut(s![i, .., ..]).assign(m);
    }
    Ok(out)
}

/// One subject's final feature record.
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub subject: String,
    /// Fisher-z correlation matrix `[R, R]`.
    pub corr: Array2<f64>,
    /// Fisher-z partial-correlation matrix `[R, R]`.
    pub pcorr: Array2<f64>,
    /// `None` when the phenotype table had no usable value.
    pub label: Option<f64>,
}

/// Pair row `i` of both tensors with the label of `subjects[i]`.
///
/// Subjects absent from `labels` get `label: None`. Both tensors must hold
/// exactly one matrix per subject.
pub fn assemble_records(
    subjects: &[String],
    corr: &Array3<f64>,
    pcorr: &Array3<f64>,
    labels: &BTreeMap<String, Option<f64>>,
) -> Result<Vec<SubjectRecord>> {
    for (what, t) in [("correlation matrices", corr), ("partial correlation matrices", pcorr)] {
        if t.len_of(Axis(0)) != subjects.len() {
            return Err(Error::LengthMismatch {
                what,
                expected: subjects.len(),
                found: t.len_of(Axis(0)),
            });
        }
    }
    Ok(subjects
        .iter()
        .enumerate()
        .map(|(i, subject)| SubjectRecord {
            subject: subject.clone(),
            corr: corr.slice(s![i, .., ..]).to_owned(),
            pcorr: pcorr.slice(s![i, .., ..]).to_owned(),
            label: labels.get(subject).copied().flatten(),
        })
        .collect())
}

impl SubjectRecord {
    /// `<raw_dir>/<subject>.safetensors`.
    pub fn path_in(&self, raw_dir: &Path) -> PathBuf {
        raw_dir.join(format!("{}.safetensors", self.subject))
    }

    /// Write `corr`, `pcorr` and (if known) `label` to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_f64_arr2("corr", &self.corr);
        w.add_f64_arr2("pcorr", &self.pcorr);
        w.add_metadata("subject", &self.subject);
        match self.label {
            Some(v) => {
                w.add_f64("label", &[v], &[1]);
                w.add_metadata("label", &v.to_string());
            }
            None => w.add_metadata("label", "unknown"),
        }
        w.write(path)
    }

    /// Read a record written by [`SubjectRecord::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let f = StFile::load(path)?;
        let need = |name: &str| -> Result<Array2<f64>> {
            f.get_arr2(name)?
                .ok_or_else(|| Error::format(path, format!("no '{name}' tensor")))
        };
        let subject = match f.metadata.get("subject") {
            Some(s) => s.clone(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        Ok(SubjectRecord {
            subject,
            corr: need("corr")?,
            pcorr: need("pcorr")?,
            label: f.tensors.get("label").and_then(|t| t.iter().next().copied()),
        })
    }
}

/// Write every record under `raw_dir`, creating it if needed.
pub fn save_records(records: &[SubjectRecord], raw_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(raw_dir)?;
    for rec in records {
        let path = rec.path_in(raw_dir);
        rec.save(&path)?;
        debug!("wrote {}", path.display());
    }
    info!("wrote {} records to {}", records.len(), raw_dir.display());
    Ok(())
}
