//! Error types for the pipeline stages that callers need to tell apart.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Variable name not served by the read contract
    #[error("Unknown variable `{0}` (expected one of: {1})")]
    UnknownVariable(String, String),

    /// Town names absent from the `towns` table
    #[error("{} town(s) missing from the towns table: {}", .0.len(), .0.join(", "))]
    UnresolvedTowns(Vec<String>),

    /// Dates absent from the `time` table
    #[error("{} date(s) missing from the time table: {:?}", .0.len(), .0)]
    UnresolvedDates(Vec<NaiveDate>),

    /// Sun-times reference table must be built over a leap year
    #[error("{0} is not a leap year, the sun-times table needs all 366 days")]
    NotLeapYear(i32),

    /// Raster file is malformed
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    /// Hourly grid lies entirely off the sun-times grid
    #[error("None of the {0} pixels lies on the sun-times grid")]
    NoSunTimesCoverage(usize),

    /// Raster lacks a band the stage needs
    #[error("Raster has no `{0}` band")]
    MissingBand(String),
}
