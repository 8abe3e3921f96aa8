/// fetch_data: load ROI time series for every listed subject and write the
/// correlation and partial-correlation matrices of the valid ones.
///
/// Output (under `<dataset-dir>/<dataset>_roi/braingnn_<atlas>/`):
///   <subject>/<subject>_<atlas>_correlation.safetensors
///   <subject>/<subject>_<atlas>_partial_correlation.safetensors
///   valid_subject_list.json
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use fcprep::PipelineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "fetch_data",
    about = "Compute functional connectivity matrices from ROI time series"
)]
struct Args {
    /// Parcellation atlas (aal3, dk, cc200, ho).
    #[arg(long, default_value = "aal3")]
    atlas: String,

    /// Dataset (adhd200, cobre, UCLA, hcp-ep).
    #[arg(long = "dataset_name", alias = "dataset-name", default_value = "adhd200")]
    dataset_name: String,

    /// Output root.
    #[arg(long = "dataset_dir", alias = "dataset-dir", default_value = "data")]
    dataset_dir: PathBuf,

    /// Input root holding `<dataset>-rest.csv` and `<dataset>_roi/`.
    #[arg(long = "data_root", alias = "data-root", default_value = "data")]
    data_root: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("{args:?}");

    let cfg = PipelineConfig {
        data_root: args.data_root,
        dataset_dir: args.dataset_dir,
        dataset: args.dataset_name,
        atlas: args.atlas,
    };

    let valid = fcprep::fetch(&cfg)
        .with_context(|| format!("fetch stage failed for dataset {}", cfg.dataset))?;
    println!("{} valid subjects → {}", valid.len(), cfg.save_dir().display());
    Ok(())
}
