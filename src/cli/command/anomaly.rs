use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use tracing::{debug, info};

use crate::{aggregate::compute_anomalies, cli::create_progress_bar, config::Config, parquet};

use super::{
    anomaly_file_name, is_daily_file_of_month, list_parquet_files, BatchReport, DataLayout,
    Outcome,
};

/// Computes anomalies month by month, or for a single `month`.
pub async fn anomaly(cfg: &Config, month: Option<u32>) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let output_dir = layout.anomaly_dir();
    fs::create_dir_all(&output_dir)?;

    let daily_files = list_parquet_files(&layout.daily_dir())?;
    let months: Vec<u32> = match month {
        Some(m) => vec![m],
        None => (1..=12).collect(),
    };

    let pb = create_progress_bar(months.len() as u64, "Computing anomalies".to_string());
    let mut report = BatchReport::default();

    for month in months {
        let files: Vec<PathBuf> = daily_files
            .iter()
            .filter(|f| is_daily_file_of_month(f, month))
            .cloned()
            .collect();
        let output_dir = output_dir.clone();

        let result = tokio::task::spawn_blocking(move || process_month(&files, &output_dir))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        report.record(format!("month {:02}", month), result, &pb);
    }
    pb.finish_with_message("Anomalies complete");

    report.into_result("months")
}

/// Writes the anomaly files of one month that do not exist yet.
fn process_month(files: &[PathBuf], output_dir: &Path) -> Result<Outcome> {
    let outputs = files
        .iter()
        .map(|f| Ok(output_dir.join(anomaly_file_name(f)?)))
        .collect::<Result<Vec<PathBuf>>>()?;

    if outputs.iter().all(|o| o.exists()) {
        debug!("All {} anomaly files exist, skipping", outputs.len());
        return Ok(Outcome::Skipped);
    }

    let daily = files
        .iter()
        .map(|f| parquet::load_raster(f))
        .collect::<Result<Vec<_>>>()?;
    let anomalies = compute_anomalies(&daily)?;

    for (raster, output) in anomalies.iter().zip(&outputs) {
        if output.exists() {
            continue;
        }
        parquet::save_raster(raster, output)?;
        info!("Wrote {}", output.display());
    }

    Ok(Outcome::Written)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use crate::raster::{band, midnight, Grid, Raster};

    use super::*;

    fn daily(year: i32, t2m: f32) -> Raster {
        let grid = Grid::new(vec![40.0], vec![-3.0]);
        let times = vec![midnight(NaiveDate::from_ymd_opt(year, 4, 1).unwrap())];
        let mut raster = Raster::new(grid, times);
        raster.add_band(band::T2M, vec![Some(t2m)]).unwrap();
        raster
    }

    fn write_inputs(dir: &Path) -> Vec<PathBuf> {
        [(2020, 10.0), (2021, 14.0)]
            .iter()
            .map(|(year, t2m)| {
                let path = dir.join(format!("era5_land_{}_04_DA.parquet", year));
                parquet::save_raster(&daily(*year, *t2m), &path).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn should_write_anomalies_for_each_year() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path());

        let outcome = process_month(&files, dir.path()).unwrap();

        assert_eq!(outcome, Outcome::Written);
        let first = parquet::load_raster(&dir.path().join("era5_land_2020_04_AnoAll.parquet")).unwrap();
        let second = parquet::load_raster(&dir.path().join("era5_land_2021_04_AnoAll.parquet")).unwrap();
        assert_eq!(first.value(band::T2M, 0, 0, 0), Some(-2.0));
        assert_eq!(second.value(band::T2M, 0, 0, 0), Some(2.0));
    }

    #[test]
    fn should_not_recompute_completed_month() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path());
        process_month(&files, dir.path()).unwrap();
        let output = dir.path().join("era5_land_2021_04_AnoAll.parquet");
        let bytes = fs::read(&output).unwrap();

        let outcome = process_month(&files, dir.path()).unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(fs::read(&output).unwrap(), bytes);
    }
}
