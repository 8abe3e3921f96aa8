/// process_data: merge persisted connectivity matrices with phenotype labels
/// into one record per subject.
///
/// Output: `<dataset-dir>/<dataset>_roi/braingnn_<atlas>/raw/<subject>.safetensors`
///   corr    [R, R]  f64  atanh(correlation)
///   pcorr   [R, R]  f64  atanh(partial correlation)
///   label   [1]     f64  omitted when the phenotype value is unusable
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use fcprep::{PipelineConfig, Score};

#[derive(Parser, Debug)]
#[command(name = "process_data", about = "Assemble per-subject connectivity feature records")]
struct Args {
    /// Parcellation atlas (aal3, dk, cc200, ho).
    #[arg(long, default_value = "aal3")]
    atlas: String,

    /// Label field (DX, Gender, Age).
    #[arg(long, default_value = "DX")]
    score: String,

    /// Dataset (adhd200, cobre, UCLA, hcp-ep).
    #[arg(long = "dataset_name", alias = "dataset-name", default_value = "adhd200")]
    dataset_name: String,

    /// Root the fetch stage wrote to.
    #[arg(long = "dataset_dir", alias = "dataset-dir", default_value = "data")]
    dataset_dir: PathBuf,

    /// Input root holding `<dataset>-rest.csv`.
    #[arg(long = "data_root", alias = "data-root", default_value = "data")]
    data_root: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("{args:?}");

    let score: Score = args.score.parse()?;
    let cfg = PipelineConfig {
        data_root: args.data_root,
        dataset_dir: args.dataset_dir,
        dataset: args.dataset_name,
        atlas: args.atlas,
    };

    let records = fcprep::process(&cfg, &score)
        .with_context(|| format!("process stage failed for dataset {}", cfg.dataset))?;
    let unknown = records.iter().filter(|r| r.label.is_none()).count();
    println!(
        "{} records ({unknown} without label) → {}",
        records.len(),
        cfg.raw_dir().display()
    );
    Ok(())
}
