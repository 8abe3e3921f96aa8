//! Phenotype labels (diagnosis, gender, age) from the subject table.
//!
//! Values are encoded per dataset and per field. A value that cannot be
//! encoded becomes `None` for that subject only; the rest of the batch is
//! unaffected.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::{DatasetSpec, GenderEncoding};
use crate::error::{Error, Result};

/// Column holding the subject identifier.
pub const SUBJECT_COLUMN: &str = "subject_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    /// Diagnosis class, integer.
    Diagnosis,
    /// Binary gender code, encoding depends on the dataset.
    Gender,
    /// Age in years.
    Age,
}

/// A phenotype column together with the field it encodes.
///
/// The column name is kept as given (`Gender`, `gender` and `sex` all encode
/// gender but name different columns).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub field: ScoreField,
    pub column: String,
}

impl FromStr for Score {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s {
            "DX" => ScoreField::Diagnosis,
            "Gender" | "gender" | "sex" => ScoreField::Gender,
            "Age" | "age" => ScoreField::Age,
            other => return Err(Error::UnsupportedScore(other.to_string())),
        };
        Ok(Score { field, column: s.to_string() })
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column)
    }
}

/// Turns raw cell text into a label value.
#[derive(Debug, Clone, Copy)]
enum Encoder {
    Integer,
    Real,
    Gender(GenderEncoding),
}

impl Encoder {
    fn for_score(score: &Score, dataset: &str) -> Result<Self> {
        Ok(match score.field {
            ScoreField::Diagnosis => Encoder::Integer,
            ScoreField::Age => Encoder::Real,
            ScoreField::Gender => Encoder::Gender(DatasetSpec::lookup(dataset)?.gender),
        })
    }

    /// Blank cells are unknown. Token gender compares the cell verbatim, so
    /// `" male"` is not the zero token.
    fn encode(self, cell: &str) -> Option<f64> {
        let raw = cell.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Encoder::Integer => raw.parse::<i64>().ok().map(|v| v as f64),
            Encoder::Real => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
            Encoder::Gender(GenderEncoding::Numeric) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(f64::trunc),
            Encoder::Gender(GenderEncoding::Token(zero)) => {
                Some(if cell == zero { 0.0 } else { 1.0 })
            }
        }
    }
}

/// Label of every requested subject present in the phenotype table.
///
/// Subjects missing from the table are missing from the map; subjects whose
/// value could not be encoded map to `None`. If a subject appears more than
/// once the last row wins.
pub fn get_subject_score(
    subjects: &[String],
    cfg: &PipelineConfig,
    score: &Score,
) -> Result<BTreeMap<String, Option<f64>>> {
    let encoder = Encoder::for_score(score, &cfg.dataset)?;
    let path = cfg.phenotype_csv();
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;

    let headers = rdr.headers()?.clone();
    let id_col = headers
        .iter()
        .position(|h| h == SUBJECT_COLUMN)
        .ok_or_else(|| Error::format(&path, format!("no '{SUBJECT_COLUMN}' column")))?;
    let score_col = headers.iter().position(|h| h == score.column);
    if score_col.is_none() {
        warn!("{}: no '{score}' column, every label will be unknown", path.display());
    }

    let mut all: HashMap<String, Option<f64>> = HashMap::new();
    for rec in rdr.records() {
        let rec = rec?;
        let Some(id) = rec.get(id_col) else { continue };
        let value = score_col
            .and_then(|c| rec.get(c))
            .and_then(|raw| encoder.encode(raw));
        all.insert(id.to_string(), value);
    }

    let mut out = BTreeMap::new();
    for subject in subjects {
        if let Some(v) = all.get(subject) {
            out.insert(subject.clone(), *v);
        }
    }
    let unknown = out.values().filter(|v| v.is_none()).count();
    if unknown > 0 {
        warn!("{unknown} of {} subjects have no usable '{score}' value", out.len());
    }
    info!("loaded '{score}' for {} of {} subjects", out.len(), subjects.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_names() {
        assert_eq!("DX".parse::<Score>().unwrap().field, ScoreField::Diagnosis);
        let sex: Score = "sex".parse().unwrap();
        assert_eq!(sex.field, ScoreField::Gender);
        assert_eq!(sex.column, "sex");
        assert_eq!("Age".parse::<Score>().unwrap().field, ScoreField::Age);
        assert!(matches!("FIQ".parse::<Score>(), Err(Error::UnsupportedScore(_))));
    }

    #[test]
    fn integer_rejects_decimals() {
        assert_eq!(Encoder::Integer.encode(" 2 "), Some(2.0));
        assert_eq!(Encoder::Integer.encode("1.0"), None);
        assert_eq!(Encoder::Integer.encode(""), None);
    }

    #[test]
    fn numeric_gender_truncates() {
        let e = Encoder::Gender(GenderEncoding::Numeric);
        assert_eq!(e.encode("1.0"), Some(1.0));
        assert_eq!(e.encode("0.9"), Some(0.0));
        assert_eq!(e.encode("nan"), None);
    }

    #[test]
    fn token_gender() {
        let e = Encoder::Gender(GenderEncoding::Token("male"));
        assert_eq!(e.encode("male"), Some(0.0));
        assert_eq!(e.encode("female"), Some(1.0));
        assert_eq!(e.encode(" male"), Some(1.0));
        assert_eq!(e.encode("Male"), Some(1.0));
        assert_eq!(e.encode("  "), None);
    }

    #[test]
    fn real_age() {
        assert_eq!(Encoder::Real.encode("23.5"), Some(23.5));
        assert_eq!(Encoder::Real.encode("n/a"), None);
        assert_eq!(Encoder::Real.encode("inf"), None);
    }

    #[test]
    fn gender_needs_known_dataset() {
        let score: Score = "Gender".parse().unwrap();
        assert!(matches!(
            Encoder::for_score(&score, "abcd"),
            Err(Error::UnsupportedDataset(_))
        ));
        // Diagnosis does not depend on the dataset.
        let dx: Score = "DX".parse().unwrap();
        assert!(Encoder::for_score(&dx, "abcd").is_ok());
    }
}
