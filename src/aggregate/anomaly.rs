//! Calendar-day anomalies across years.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Datelike;

use crate::{error::PipelineError, raster::Raster};

/// `(month, day)`; 29 February is its own key.
pub type CalendarDay = (u32, u32);

/// Subtracts, per pixel and band, the multi-year mean of each calendar day.
///
/// Every input must share one grid and one band set. The output is aligned
/// with `daily`: same grids, times and bands, values replaced by anomalies.
pub fn compute_anomalies(daily: &[Raster]) -> Result<Vec<Raster>> {
    let Some(first) = daily.first() else {
        return Ok(Vec::new());
    };
    let band_names: Vec<&String> = first.bands.keys().collect();

    for raster in daily {
        if !raster.grid.same_shape(&first.grid) {
            return Err(PipelineError::InvalidRaster(
                "daily rasters do not share a grid".to_string(),
            )
            .into());
        }
        if raster.bands.keys().ne(first.bands.keys()) {
            return Err(PipelineError::InvalidRaster(
                "daily rasters do not share a band set".to_string(),
            )
            .into());
        }
    }

    // calendar day -> (raster index, time index)
    let mut groups: BTreeMap<CalendarDay, Vec<(usize, usize)>> = BTreeMap::new();
    for (r, raster) in daily.iter().enumerate() {
        for (t, time) in raster.times.iter().enumerate() {
            groups
                .entry((time.month(), time.day()))
                .or_default()
                .push((r, t));
        }
    }

    let plane = first.grid.len();
    let mut anomalies: Vec<Raster> = daily.to_vec();

    for name in band_names {
        for members in groups.values() {
            let mut sums = vec![0.0f64; plane];
            let mut counts = vec![0usize; plane];
            for &(r, t) in members {
                let values = daily[r].plane(name, t)?;
                for (pixel, v) in values.iter().enumerate() {
                    if let Some(v) = v {
                        sums[pixel] += *v as f64;
                        counts[pixel] += 1;
                    }
                }
            }

            let means: Vec<Option<f64>> = sums
                .iter()
                .zip(&counts)
                .map(|(sum, &n)| (n > 0).then(|| sum / n as f64))
                .collect();

            for &(r, t) in members {
                let out = anomalies[r].band_mut(name)?;
                for (pixel, mean) in means.iter().enumerate() {
                    let slot = &mut out[t * plane + pixel];
                    *slot = slot.zip(*mean).map(|(v, m)| (v as f64 - m) as f32);
                }
            }
        }
    }

    Ok(anomalies)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::raster::{band, midnight, Grid};

    use super::*;

    fn daily(year: i32, month: u32, days: &[u32], values: Vec<Option<f32>>) -> Raster {
        let grid = Grid::new(vec![40.0], vec![-3.0, -2.9]);
        let times = days
            .iter()
            .map(|d| midnight(NaiveDate::from_ymd_opt(year, month, *d).unwrap()))
            .collect();
        let mut raster = Raster::new(grid, times);
        raster.add_band(band::T2M, values).unwrap();
        raster
    }

    #[test]
    fn should_sum_anomalies_to_zero_per_calendar_day() {
        let inputs = vec![
            daily(2019, 3, &[1, 2], vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            daily(2020, 3, &[1, 2], vec![Some(2.0), Some(6.0), Some(5.0), Some(0.5)]),
            daily(2021, 3, &[1, 2], vec![Some(6.0), Some(1.0), Some(1.0), Some(2.0)]),
        ];

        let anomalies = compute_anomalies(&inputs).unwrap();

        for t in 0..2 {
            for col in 0..2 {
                let sum: f32 = anomalies
                    .iter()
                    .map(|a| a.value(band::T2M, t, 0, col).unwrap())
                    .sum();
                assert!(sum.abs() < 1e-5, "t {} col {}: {}", t, col, sum);
            }
        }
        // mean of 1, 2, 6 is 3
        assert_eq!(anomalies[0].value(band::T2M, 0, 0, 0), Some(-2.0));
        assert_eq!(anomalies[2].value(band::T2M, 0, 0, 0), Some(3.0));
    }

    #[test]
    fn should_keep_leap_day_as_its_own_group() {
        let inputs = vec![
            daily(2019, 2, &[28], vec![Some(10.0), Some(10.0)]),
            daily(2020, 2, &[28, 29], vec![Some(20.0), Some(20.0), Some(7.0), Some(7.0)]),
        ];

        let anomalies = compute_anomalies(&inputs).unwrap();

        assert_eq!(anomalies[0].value(band::T2M, 0, 0, 0), Some(-5.0));
        assert_eq!(anomalies[1].value(band::T2M, 0, 0, 0), Some(5.0));
        // single-member group: anomaly against itself
        assert_eq!(anomalies[1].value(band::T2M, 1, 0, 1), Some(0.0));
    }

    #[test]
    fn should_skip_undefined_values_in_mean() {
        let inputs = vec![
            daily(2019, 5, &[1], vec![Some(4.0), None]),
            daily(2020, 5, &[1], vec![None, Some(1.0)]),
            daily(2021, 5, &[1], vec![Some(8.0), Some(3.0)]),
        ];

        let anomalies = compute_anomalies(&inputs).unwrap();

        assert_eq!(anomalies[0].value(band::T2M, 0, 0, 0), Some(-2.0));
        assert_eq!(anomalies[1].value(band::T2M, 0, 0, 0), None);
        assert_eq!(anomalies[0].value(band::T2M, 0, 0, 1), None);
        assert_eq!(anomalies[2].value(band::T2M, 0, 0, 1), Some(1.0));
    }

    #[test]
    fn should_reject_mismatched_grids() {
        let mut other = daily(2020, 1, &[1], vec![Some(1.0), Some(1.0)]);
        other.grid = Grid::new(vec![41.0], vec![-3.0, -2.9]);
        let inputs = vec![daily(2019, 1, &[1], vec![Some(1.0), Some(1.0)]), other];

        assert!(compute_anomalies(&inputs).is_err());
    }
}
