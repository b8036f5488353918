use std::{fs, path::Path};

use anyhow::Result;
use tracing::debug;

use crate::{cli::create_progress_bar, config::Config, parquet, raster::Raster};

use super::{file_stem, list_parquet_files, BatchReport, DataLayout, Outcome};

/// Splits `file`, or every raw MODIS file, into one file per date.
pub async fn split_modis(cfg: &Config, file: Option<&Path>) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let output_dir = layout.modis_dir();
    fs::create_dir_all(&output_dir)?;

    let files = match file {
        Some(file) => vec![file.to_path_buf()],
        None => list_parquet_files(&layout.modis_raw_dir())?,
    };

    let mut report = BatchReport::default();
    for file in files {
        let raster = parquet::load_raster(&file)?;
        let stem = file_stem(&file)?.to_string();

        let pb = create_progress_bar(raster.times.len() as u64, format!("Splitting {}", stem));
        for t in 0..raster.times.len() {
            let output = output_dir.join(split_file_name(&stem, &raster, t));
            let result = write_slice(&raster, t, &output);
            report.record(output.display(), result, &pb);
        }
        pb.finish_with_message(format!("{} split", stem));
    }

    report.into_result("MODIS dates")
}

/// `<stem>_<YYYYMMDD>.parquet`
fn split_file_name(stem: &str, raster: &Raster, t: usize) -> String {
    format!("{}_{}.parquet", stem, raster.times[t].format("%Y%m%d"))
}

fn write_slice(raster: &Raster, t: usize, output: &Path) -> Result<Outcome> {
    if output.exists() {
        debug!("{} exists, skipping", output.display());
        return Ok(Outcome::Skipped);
    }
    parquet::save_raster(&raster.select_time(t), output)?;

    Ok(Outcome::Written)
}

// -- Tests -------------------------------------------------------------------
