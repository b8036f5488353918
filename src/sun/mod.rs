//! Sunrise/sunset reference table over a leap year.
//!
//! The table is a [`Raster`] whose time axis is every date of the reference
//! leap year (so day-of-year 1..=366) and whose `sunrise`/`sunset` bands hold
//! the time of day in seconds after 00:00 UTC.

pub mod solar;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    error::PipelineError,
    raster::{band, midnight, Grid, Raster},
};

pub use solar::{sun_events, SunEvents};

pub const DAYS_IN_LEAP_YEAR: usize = 366;
pub const DEFAULT_REFERENCE_YEAR: i32 = 2020;
pub const TIME_UNITS: &str = "seconds since 00:00 UTC";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimesRequest {
    pub bbox: BoundingBox,
    pub nrows: usize,
    pub ncols: usize,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub struct SunTimes {
    raster: Raster,
}

impl SunTimes {
    /// Computes sunrise/sunset for every pixel centre and every day of `request.year`.
    pub fn build(request: &SunTimesRequest) -> Result<Self> {
        if !is_leap_year(request.year) {
            return Err(PipelineError::NotLeapYear(request.year).into());
        }

        let bbox = request.bbox;
        let latitudes = linspace(bbox.north, bbox.south, request.nrows);
        let longitudes = linspace(bbox.west, bbox.east, request.ncols);
        let grid = Grid::new(latitudes, longitudes);
        let dates: Vec<NaiveDate> = NaiveDate::from_ymd_opt(request.year, 1, 1)
            .ok_or_else(|| anyhow::anyhow!("Invalid year {}", request.year))?
            .iter_days()
            .take(DAYS_IN_LEAP_YEAR)
            .collect();

        info!(
            "Computing sun times for {} pixels x {} days",
            grid.len(),
            dates.len()
        );

        let plane = grid.len();
        let events: Vec<Option<SunEvents>> = (0..dates.len() * plane)
            .into_par_iter()
            .map(|idx| {
                let (lat, lon) = grid.pixel_coords(idx % plane);
                sun_events(dates[idx / plane], lat, lon)
            })
            .collect();

        let undefined = events.iter().filter(|e| e.is_none()).count();
        if undefined > 0 {
            debug!("{} pixel-days without sunrise or sunset", undefined);
        }

        let sunrise = events.iter().map(|e| e.map(|e| e.sunrise as f32)).collect();
        let sunset = events.iter().map(|e| e.map(|e| e.sunset as f32)).collect();

        let times = dates.iter().copied().map(midnight).collect();
        let mut raster = Raster::new(grid, times);
        raster.add_band(band::SUNRISE, sunrise)?;
        raster.add_band(band::SUNSET, sunset)?;

        Ok(SunTimes { raster })
    }

    /// Wraps a loaded table, checking it covers all 366 days.
    pub fn from_raster(raster: Raster) -> Result<Self> {
        if raster.times.len() != DAYS_IN_LEAP_YEAR {
            return Err(PipelineError::InvalidRaster(format!(
                "sun-times table has {} days, expected {}",
                raster.times.len(),
                DAYS_IN_LEAP_YEAR
            ))
            .into());
        }
        raster.band(band::SUNRISE)?;
        raster.band(band::SUNSET)?;

        Ok(SunTimes { raster })
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn grid(&self) -> &Grid {
        &self.raster.grid
    }

    /// Sunrise and sunset (seconds after midnight UTC) for a reference
    /// day-of-year and pixel.
    pub fn lookup(&self, doy: u32, row: usize, col: usize) -> Option<(u32, u32)> {
        let t = (doy as usize).checked_sub(1)?;
        let sunrise = self.raster.value(band::SUNRISE, t, row, col)?;
        let sunset = self.raster.value(band::SUNSET, t, row, col)?;
        Some((sunrise as u32, sunset as u32))
    }
}

/// Day-of-year in the leap-year reference table for `date`.
///
/// Non-leap years skip 29 February, so their days from 1 March onwards
/// (day-of-year 60 and later) are one behind the reference calendar.
pub fn reference_doy(date: NaiveDate) -> u32 {
    let doy = date.ordinal();
    if !is_leap_year(date.year()) && doy >= 60 {
        doy + 1
    } else {
        doy
    }
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request(year: i32) -> SunTimesRequest {
        SunTimesRequest {
            bbox: BoundingBox {
                west: -4.0,
                east: -3.8,
                north: 40.5,
                south: 40.4,
            },
            nrows: 2,
            ncols: 3,
            year,
        }
    }

    #[test]
    fn should_shift_non_leap_doy_from_march() {
        for doy in 1..=365u32 {
            let date = NaiveDate::from_yo_opt(2021, doy).unwrap();
            let expected = if doy >= 60 { doy + 1 } else { doy };
            assert_eq!(reference_doy(date), expected, "doy {}", doy);
        }
    }

    #[test]
    fn should_keep_leap_year_doy() {
        for doy in 1..=366u32 {
            let date = NaiveDate::from_yo_opt(2024, doy).unwrap();
            assert_eq!(reference_doy(date), doy);
        }
    }

    #[test]
    fn should_align_calendar_dates_with_reference_year() {
        let reference = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap().ordinal();
        let date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();

        assert_eq!(reference_doy(date), reference);
    }

    #[test]
    fn should_reject_non_leap_reference_year() {
        let err = SunTimes::build(&request(2021)).unwrap_err();

        assert!(err.to_string().contains("not a leap year"));
    }

    #[test]
    fn should_build_table_covering_all_366_days() {
        let table = SunTimes::build(&request(2020)).unwrap();

        assert_eq!(table.raster().times.len(), 366);
        assert_eq!(table.grid().rows(), 2);
        assert_eq!(table.grid().cols(), 3);
        assert!((table.grid().latitudes[1] - 40.4).abs() < 1e-9);
        assert!((table.grid().longitudes[2] + 3.8).abs() < 1e-9);

        for doy in [1, 60, 200, 366] {
            let (sunrise, sunset) = table.lookup(doy, 1, 2).unwrap();
            assert!(sunrise < sunset);
        }
        assert!(table.lookup(0, 0, 0).is_none());
        assert!(table.lookup(367, 0, 0).is_none());
    }

    #[test]
    fn should_match_direct_computation() {
        let table = SunTimes::build(&request(2020)).unwrap();
        let date = NaiveDate::from_ymd_opt(2020, 7, 15).unwrap();
        let (lat, lon) = (table.grid().latitudes[0], table.grid().longitudes[1]);
        let direct = sun_events(date, lat, lon).unwrap();

        let (sunrise, sunset) = table.lookup(date.ordinal(), 0, 1).unwrap();
        assert_eq!((sunrise, sunset), (direct.sunrise, direct.sunset));
    }

    #[test]
    fn should_reject_incomplete_table() {
        let table = SunTimes::build(&request(2020)).unwrap();
        let truncated = table.raster().select_time(0);

        assert!(SunTimes::from_raster(truncated).is_err());
    }
}
