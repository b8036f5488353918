pub mod anomaly;
pub mod daily;
pub mod era5;
pub mod modis;
pub mod query;
pub mod split_modis;
pub mod sun_times;
pub mod time;
pub mod towns;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Result};
use indicatif::ProgressBar;

pub use anomaly::anomaly;
pub use daily::daily;
pub use era5::load_era5;
pub use modis::load_modis;
pub use query::{dates, query};
pub use split_modis::split_modis;
pub use sun_times::sun_times;
pub use time::time;
pub use towns::towns;

/// File locations under the data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataLayout { root: root.into() }
    }

    /// Hourly ERA5-Land rasters, one per year and month.
    pub fn hourly_dir(&self) -> PathBuf {
        self.root.join("ERA5-Land")
    }

    pub fn sun_times_file(&self) -> PathBuf {
        self.root.join("sunrise_sunset.parquet")
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.root.join("ERA5D-Land")
    }

    pub fn anomaly_dir(&self) -> PathBuf {
        self.root.join("anomaly_all")
    }

    pub fn modis_raw_dir(&self) -> PathBuf {
        self.root.join("modis_raw")
    }

    pub fn modis_dir(&self) -> PathBuf {
        self.root.join("modis_ndvi")
    }

    pub fn towns_file(&self) -> PathBuf {
        self.root.join("shapefiles").join("towns.geojson")
    }
}

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid file name `{}`", path.display()))
}

/// `era5_land_2020_03.parquet` -> `era5_land_2020_03_DA.parquet`
pub fn daily_file_name(hourly: &Path) -> Result<String> {
    Ok(format!("{}_DA.parquet", file_stem(hourly)?))
}

/// `era5_land_2020_03_DA.parquet` -> `era5_land_2020_03_AnoAll.parquet`
pub fn anomaly_file_name(daily: &Path) -> Result<String> {
    let stem = file_stem(daily)?;
    let stem = stem.strip_suffix("_DA").unwrap_or(stem);
    Ok(format!("{}_AnoAll.parquet", stem))
}

/// Whether a daily file belongs to `month`.
pub fn is_daily_file_of_month(path: &Path, month: u32) -> bool {
    file_stem(path)
        .map(|s| s.ends_with(&format!("_{:02}_DA", month)))
        .unwrap_or(false)
}

/// Parquet files directly under `dir`, sorted by name.
pub fn list_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| anyhow!("Failed to read {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    files.sort();

    Ok(files)
}

/// Result of one unit of batch work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Skipped,
    Inserted(u64),
}

/// Tally of a batch where one failed item does not stop the rest.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: usize,
    pub skipped: usize,
    pub inserted: u64,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, item: impl fmt::Display, result: Result<Outcome>, pb: &ProgressBar) {
        match result {
            Ok(Outcome::Written) => self.written += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Ok(Outcome::Inserted(n)) => {
                self.written += 1;
                self.inserted += n;
            }
            Err(e) => {
                self.failed += 1;
                pb.println(format!("Error processing {}: {:#}", item, e));
                tracing::error!("Error processing {}: {:#}", item, e);
            }
        }
        pb.inc(1);
    }

    /// Summary message, or an error when any item failed.
    pub fn into_result(self, what: &str) -> Result<String> {
        if self.failed > 0 {
            bail!(
                "{} of {} {} failed",
                self.failed,
                self.failed + self.written + self.skipped,
                what
            );
        }

        let mut summary = format!("{} {} processed, {} skipped", self.written, what, self.skipped);
        if self.inserted > 0 {
            summary.push_str(&format!(", {} rows inserted", self.inserted));
        }
        Ok(summary)
    }
}

// -- Tests -------------------------------------------------------------------
