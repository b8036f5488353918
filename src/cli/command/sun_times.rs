use std::fs;

use anyhow::Result;

use crate::{
    cli::create_spinner,
    config::Config,
    parquet,
    sun::{SunTimes, SunTimesRequest, TIME_UNITS},
};

use super::DataLayout;

pub async fn sun_times(cfg: &Config, request: SunTimesRequest) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let file_path = layout.sun_times_file();
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let bar = create_spinner(format!(
        "Computing sun times for {}x{} pixels...",
        request.nrows, request.ncols
    ));
    let table = tokio::task::spawn_blocking(move || SunTimes::build(&request)).await??;
    bar.finish_with_message("Sun times computed");

    let year = request.year.to_string();
    parquet::save_raster_with_metadata(
        table.raster(),
        &file_path,
        &[("units", TIME_UNITS), ("reference_year", &year)],
    )?;

    Ok(file_path.to_string_lossy().to_string())
}
