use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use futures::{stream, StreamExt};
use tracing::{debug, info};

use crate::{
    aggregate::aggregate_daily,
    cli::create_progress_bar,
    config::Config,
    parquet,
    sun::SunTimes,
};

use super::{daily_file_name, list_parquet_files, BatchReport, DataLayout, Outcome};

/// Aggregates every hourly file that has no daily counterpart yet.
pub async fn daily(cfg: &Config) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let output_dir = layout.daily_dir();
    fs::create_dir_all(&output_dir)?;

    let sun_file = layout.sun_times_file();
    let sun = parquet::load_raster(&sun_file)
        .and_then(SunTimes::from_raster)
        .map_err(|e| {
            anyhow!(
                "Sun times unavailable at {} (run `sun-times` first): {}",
                sun_file.display(),
                e
            )
        })?;
    let sun = Arc::new(sun);

    let files = list_parquet_files(&layout.hourly_dir())?;
    info!("Aggregating {} hourly files with {} workers", files.len(), cfg.workers);

    let pb = create_progress_bar(files.len() as u64, "Aggregating to daily".to_string());
    let mut results = stream::iter(files)
        .map(|file| {
            let sun = Arc::clone(&sun);
            let output_dir = output_dir.clone();
            async move {
                let task_file = file.clone();
                let result =
                    tokio::task::spawn_blocking(move || process_file(&task_file, &output_dir, &sun))
                        .await
                        .map_err(anyhow::Error::from)
                        .and_then(|r| r);
                (file, result)
            }
        })
        .buffer_unordered(cfg.workers as usize);

    let mut report = BatchReport::default();
    while let Some((file, result)) = results.next().await {
        report.record(file.display(), result, &pb);
    }
    pb.finish_with_message("Daily aggregation complete");

    report.into_result("hourly files")
}

fn process_file(file: &Path, output_dir: &Path, sun: &SunTimes) -> Result<Outcome> {
    let output: PathBuf = output_dir.join(daily_file_name(file)?);
    if output.exists() {
        debug!("{} exists, skipping", output.display());
        return Ok(Outcome::Skipped);
    }

    let hourly = parquet::load_raster(file)?;
    let daily = aggregate_daily(&hourly, sun)?;
    parquet::save_raster(&daily, &output)?;

    Ok(Outcome::Written)
}

// -- Tests -------------------------------------------------------------------
