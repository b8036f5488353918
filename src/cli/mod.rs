//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use clap::{command, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{db::Variable, spatial::JoinPredicate, sun::DEFAULT_REFERENCE_YEAR};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the sunrise/sunset reference table
    SunTimes {
        #[arg(long, default_value_t = -10.0, allow_hyphen_values = true)]
        west: f64,
        #[arg(long, default_value_t = 5.0, allow_hyphen_values = true)]
        east: f64,
        #[arg(long, default_value_t = 44.0, allow_hyphen_values = true)]
        north: f64,
        #[arg(long, default_value_t = 35.0, allow_hyphen_values = true)]
        south: f64,
        #[arg(long, default_value_t = 91)]
        nrows: usize,
        #[arg(long, default_value_t = 151)]
        ncols: usize,
        /// Reference leap year
        #[arg(long, default_value_t = DEFAULT_REFERENCE_YEAR)]
        year: i32,
    },
    /// Aggregate hourly ERA5-Land files to daily files
    Daily {},
    /// Compute calendar-day anomalies of the daily files
    Anomaly {
        /// Only this month (1-12)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// Create and fill the towns table
    Towns {
        /// GeoJSON town boundaries (default: <data dir>/shapefiles/towns.geojson)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Create and fill the time table
    Time {
        #[arg(long, default_value = "1950-01-01")]
        start: NaiveDate,
        #[arg(long, default_value = "2024-07-31")]
        end: NaiveDate,
    },
    /// Load ERA5 anomalies into the measurement store
    LoadEra5 {
        /// GeoJSON town boundaries (default: <data dir>/shapefiles/towns.geojson)
        #[arg(long)]
        towns: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t)]
        predicate: JoinPredicate,
    },
    /// Split multi-date MODIS files into one file per date
    SplitModis {
        /// Only this file (default: every file under <data dir>/modis_raw)
        file: Option<PathBuf>,
    },
    /// Load quality-masked MODIS NDVI into the measurement store
    LoadModis {
        /// GeoJSON town boundaries (default: <data dir>/shapefiles/towns.geojson)
        #[arg(long)]
        towns: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t)]
        predicate: JoinPredicate,
    },
    /// Town values of a variable on a date, as GeoJSON
    Query {
        variable: Variable,
        date: NaiveDate,
        /// Write the GeoJSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Dates with measurements for a variable
    Dates {
        variable: Variable,
    },
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------
