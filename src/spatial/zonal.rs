//! Per-town averages of raster bands.

use anyhow::Result;
use chrono::NaiveDate;

use crate::raster::Raster;

use super::{join::TownPixels, towns::Town};

/// One town on one date, values in the order of the requested bands.
#[derive(Debug, Clone, PartialEq)]
pub struct TownRow {
    pub town_name: String,
    pub date: NaiveDate,
    pub values: Vec<Option<f32>>,
}

pub fn round2(value: f64) -> f32 {
    ((value * 100.0).round() / 100.0) as f32
}

/// Averages `bands` over each town's pixels for every time slice.
///
/// Undefined pixels are excluded per band. A (town, date) with no defined
/// value in any band produces no row.
pub fn town_means(
    raster: &Raster,
    join: &[TownPixels],
    towns: &[Town],
    bands: &[&str],
) -> Result<Vec<TownRow>> {
    let values = bands
        .iter()
        .map(|name| raster.band(name))
        .collect::<Result<Vec<_>, _>>()?;
    let plane = raster.grid.len();
    let mut rows = Vec::new();

    for (t, time) in raster.times.iter().enumerate() {
        let offset = t * plane;
        for matched in join {
            let means: Vec<Option<f32>> = values
                .iter()
                .map(|band| {
                    let (sum, count) = matched
                        .pixels
                        .iter()
                        .filter_map(|&p| band[offset + p])
                        .fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
                    (count > 0).then(|| round2(sum / count as f64))
                })
                .collect();

            if means.iter().all(Option::is_none) {
                continue;
            }
            rows.push(TownRow {
                town_name: towns[matched.town].name.clone(),
                date: time.date(),
                values: means,
            });
        }
    }

    Ok(rows)
}

// -- Tests -------------------------------------------------------------------
