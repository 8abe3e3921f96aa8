//! Subject registry: the ordered list of subject IDs for a dataset.
//!
//! Reads column 0 of `<data_root>/<dataset>-rest.csv`, skipping the header row
//! and blank rows.
use log::info;

use crate::config::PipelineConfig;
use crate::error::Result;

/// Subject IDs in file order.
pub fn load_subject_ids(cfg: &PipelineConfig) -> Result<Vec<String>> {
    let path = cfg.phenotype_csv();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(&path)?;

    let mut ids = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        match rec.get(0) {
            Some(id) if !id.trim().is_empty() => ids.push(id.to_string()),
            _ => {}
        }
    }
    info!("{} subjects listed in {}", ids.len(), path.display());
    Ok(ids)
}
