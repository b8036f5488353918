//! Hourly to daily aggregation, plus the sunrise/sunset driven day/night split.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::{
    error::PipelineError,
    raster::{band, midnight, Band, Raster},
    sun::{reference_doy, SunTimes},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Sum,
    Mean,
    Min,
    Max,
}

/// `(hourly band, statistic, daily band)`; bands absent from the input are skipped.
const RESAMPLING: [(&str, Stat, &str); 6] = [
    (band::TP, Stat::Sum, band::TP),
    (band::T2M, Stat::Mean, band::T2M),
    (band::T2M, Stat::Min, band::T2M_MIN),
    (band::T2M, Stat::Max, band::T2M_MAX),
    (band::LAI_HV, Stat::Mean, band::LAI_HV),
    (band::LAI_LV, Stat::Mean, band::LAI_LV),
];

/// Reduces the defined samples; `None` when there are none. Non-finite
/// samples count as undefined.
pub fn reduce(values: impl IntoIterator<Item = Option<f32>>, stat: Stat) -> Option<f32> {
    let mut count = 0usize;
    let mut acc = match stat {
        Stat::Sum | Stat::Mean => 0.0f64,
        Stat::Min => f64::INFINITY,
        Stat::Max => f64::NEG_INFINITY,
    };

    for v in values.into_iter().flatten().filter(|v| v.is_finite()) {
        let v = v as f64;
        acc = match stat {
            Stat::Sum | Stat::Mean => acc + v,
            Stat::Min => acc.min(v),
            Stat::Max => acc.max(v),
        };
        count += 1;
    }

    match (count, stat) {
        (0, _) => None,
        (n, Stat::Mean) => Some((acc / n as f64) as f32),
        _ => Some(acc as f32),
    }
}

/// Hour indices of `times` grouped by calendar day of the native time axis.
pub fn group_by_day(times: &[NaiveDateTime]) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (idx, t) in times.iter().enumerate() {
        days.entry(t.date()).or_default().push(idx);
    }
    days
}

/// Resamples an hourly raster to daily sum/mean/min/max bands.
pub fn hourly_to_daily(hourly: &Raster) -> Result<Raster> {
    hourly.band(band::TP)?;
    hourly.band(band::T2M)?;

    let days = group_by_day(&hourly.times);
    let plane = hourly.grid.len();
    let times = days.keys().copied().map(midnight).collect();
    let mut daily = Raster::new(hourly.grid.clone(), times);

    for (source, stat, target) in RESAMPLING {
        let Ok(values) = hourly.band(source) else {
            debug!("No `{}` band, skipping `{}`", source, target);
            continue;
        };

        let mut out: Band = Vec::with_capacity(days.len() * plane);
        for hours in days.values() {
            for pixel in 0..plane {
                out.push(reduce(hours.iter().map(|&h| values[h * plane + pixel]), stat));
            }
        }
        daily.add_band(target, out)?;
    }

    Ok(daily)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DayNight {
    pub diurnal_temp_variation: Option<f32>,
    pub max_nocturnal_temp: Option<f32>,
    pub min_diurnal_temp: Option<f32>,
}

/// Splits one pixel's samples for `date` at sunrise and sunset.
///
/// `sunrise`/`sunset` are seconds after midnight. Samples inside
/// `[sunrise, sunset]` are diurnal, the rest nocturnal. When sunset's time of
/// day precedes sunrise's the daylight interval wraps midnight; in UTC that
/// only happens far east or west of the Iberian grid, where local noon drifts
/// towards 00:00 UTC.
pub fn split_day_night(
    date: NaiveDate,
    samples: &[(NaiveDateTime, Option<f32>)],
    sunrise: u32,
    sunset: u32,
) -> DayNight {
    let start = midnight(date);
    let sunrise = start + Duration::seconds(sunrise as i64);
    let sunset = start + Duration::seconds(sunset as i64);
    let is_diurnal = |t: NaiveDateTime| {
        if sunrise <= sunset {
            sunrise <= t && t <= sunset
        } else {
            t >= sunrise || t <= sunset
        }
    };

    let diurnal = || {
        samples
            .iter()
            .filter(|(t, _)| is_diurnal(*t))
            .map(|(_, v)| *v)
    };
    let nocturnal = samples
        .iter()
        .filter(|(t, _)| !is_diurnal(*t))
        .map(|(_, v)| *v);

    let diurnal_max = reduce(diurnal(), Stat::Max);
    let diurnal_min = reduce(diurnal(), Stat::Min);

    DayNight {
        diurnal_temp_variation: diurnal_max.zip(diurnal_min).map(|(max, min)| max - min),
        max_nocturnal_temp: reduce(nocturnal, Stat::Max),
        min_diurnal_temp: diurnal_min,
    }
}

/// Adds the day/night derived bands to `daily`, reading hourly `t2m`.
///
/// Each hourly pixel takes the sun-times pixel whose footprint contains it.
/// Pixels without one, or with an undefined entry, get undefined derived
/// values. Fails when no pixel at all lies on the sun-times grid.
pub fn add_day_night_bands(hourly: &Raster, daily: &mut Raster, sun: &SunTimes) -> Result<()> {
    let t2m = hourly.band(band::T2M)?;
    let grid = &hourly.grid;
    let plane = grid.len();

    // hourly pixel -> sun-times pixel, resolved once
    let sun_index = sun.grid().index();
    let sun_pixels: Vec<Option<(usize, usize)>> = (0..plane)
        .map(|p| {
            let (lat, lon) = grid.pixel_coords(p);
            sun_index.nearest(lat, lon)
        })
        .collect();
    let unmatched = sun_pixels.iter().filter(|p| p.is_none()).count();
    if plane > 0 && unmatched == plane {
        return Err(PipelineError::NoSunTimesCoverage(plane).into());
    }
    if unmatched > 0 {
        warn!("{} of {} pixels have no sun-times entry", unmatched, plane);
    }

    let days = group_by_day(&hourly.times);
    let mut variation: Band = Vec::with_capacity(days.len() * plane);
    let mut nocturnal_max: Band = Vec::with_capacity(days.len() * plane);
    let mut diurnal_min: Band = Vec::with_capacity(days.len() * plane);

    for (date, hours) in &days {
        let doy = reference_doy(*date);
        for (pixel, sun_pixel) in sun_pixels.iter().enumerate() {
            let split = sun_pixel
                .and_then(|(row, col)| sun.lookup(doy, row, col))
                .map(|(sunrise, sunset)| {
                    let samples: Vec<(NaiveDateTime, Option<f32>)> = hours
                        .iter()
                        .map(|&h| (hourly.times[h], t2m[h * plane + pixel]))
                        .collect();
                    split_day_night(*date, &samples, sunrise, sunset)
                })
                .unwrap_or_default();

            variation.push(split.diurnal_temp_variation);
            nocturnal_max.push(split.max_nocturnal_temp);
            diurnal_min.push(split.min_diurnal_temp);
        }
    }

    daily.add_band(band::DIURNAL_TEMP_VARIATION, variation)?;
    daily.add_band(band::MAX_NOCTURNAL_TEMP, nocturnal_max)?;
    daily.add_band(band::MIN_DIURNAL_TEMP, diurnal_min)?;

    Ok(())
}

/// Full daily aggregation of one hourly raster.
pub fn aggregate_daily(hourly: &Raster, sun: &SunTimes) -> Result<Raster> {
    let mut daily = hourly_to_daily(hourly)?;
    add_day_night_bands(hourly, &mut daily, sun)?;
    Ok(daily)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::{
        raster::Grid,
        sun::{BoundingBox, SunTimesRequest},
    };

    use super::*;

    // Hours 00..23 of a single day
    const TEMPS: [f32; 24] = [
        10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 19.0, 20.0, 19.0,
        18.0, 16.0, 14.0, 12.0, 11.0, 10.0, 9.0, 8.0,
    ];

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 7, 1).unwrap()
    }

    fn samples(values: &[Option<f32>]) -> Vec<(NaiveDateTime, Option<f32>)> {
        values
            .iter()
            .enumerate()
            .map(|(h, v)| (midnight(day()) + Duration::hours(h as i64), *v))
            .collect()
    }

    /// Single-pixel hourly raster over `hours` hours starting at `day()`.
    fn hourly_fixture(t2m: Vec<Option<f32>>, tp: Vec<Option<f32>>) -> Raster {
        let grid = Grid::new(vec![40.0], vec![-3.0]);
        let times = (0..t2m.len())
            .map(|h| midnight(day()) + Duration::hours(h as i64))
            .collect();
        let mut raster = Raster::new(grid, times);
        raster.add_band(band::T2M, t2m).unwrap();
        raster.add_band(band::TP, tp).unwrap();
        raster
    }

    #[test]
    fn should_split_known_day_at_sunrise_and_sunset() {
        let values: Vec<Option<f32>> = TEMPS.iter().map(|v| Some(*v)).collect();
        let split = split_day_night(day(), &samples(&values), 6 * 3600, 20 * 3600);

        // Diurnal hours 06..=20: min 6, max 20. Nocturnal 00..05 and 21..23: max 10.
        assert_eq!(split.diurnal_temp_variation, Some(14.0));
        assert_eq!(split.min_diurnal_temp, Some(6.0));
        assert_eq!(split.max_nocturnal_temp, Some(10.0));
    }

    #[test]
    fn should_leave_variation_undefined_without_diurnal_samples() {
        let values: Vec<Option<f32>> = (0..6).map(|h| Some(TEMPS[h])).collect();
        let split = split_day_night(day(), &samples(&values), 6 * 3600, 20 * 3600);

        assert_eq!(split.diurnal_temp_variation, None);
        assert_eq!(split.min_diurnal_temp, None);
        assert_eq!(split.max_nocturnal_temp, Some(10.0));
    }

    #[test]
    fn should_skip_undefined_samples_in_split() {
        let mut values: Vec<Option<f32>> = TEMPS.iter().map(|v| Some(*v)).collect();
        values[14] = None;
        let split = split_day_night(day(), &samples(&values), 6 * 3600, 20 * 3600);

        assert_eq!(split.diurnal_temp_variation, Some(13.0));
    }

    #[test]
    fn should_treat_wrapped_daylight_as_diurnal() {
        let values: Vec<Option<f32>> = TEMPS.iter().map(|v| Some(*v)).collect();
        // daylight 12:00 -> 03:00 next day, night 04..11
        let split = split_day_night(day(), &samples(&values), 12 * 3600, 3 * 3600);

        assert_eq!(split.min_diurnal_temp, Some(7.0));
        assert_eq!(split.max_nocturnal_temp, Some(16.0));
        assert_eq!(split.diurnal_temp_variation, Some(13.0));
    }

    #[test]
    fn should_keep_diurnal_variation_non_negative() {
        for sunrise in (0..24).map(|h| h * 3600) {
            let values: Vec<Option<f32>> = TEMPS.iter().map(|v| Some(*v)).collect();
            let split = split_day_night(day(), &samples(&values), sunrise, 20 * 3600);
            if let Some(v) = split.diurnal_temp_variation {
                assert!(v >= 0.0);
            }
        }
    }

    #[test]
    fn should_reduce_defined_values() {
        let values = vec![Some(1.0), None, Some(4.0), Some(1.5)];

        assert_eq!(reduce(values.clone(), Stat::Sum), Some(6.5));
        assert_eq!(reduce(values.clone(), Stat::Mean), Some(6.5 / 3.0));
        assert_eq!(reduce(values.clone(), Stat::Min), Some(1.0));
        assert_eq!(reduce(values, Stat::Max), Some(4.0));
        assert_eq!(reduce(vec![None, None], Stat::Sum), None);
    }

    #[test]
    fn should_treat_nan_samples_as_undefined() {
        let mut t2m: Vec<Option<f32>> = TEMPS.iter().map(|v| Some(*v + 270.0)).collect();
        t2m[3] = Some(f32::NAN);
        let hourly = hourly_fixture(t2m, vec![Some(f32::NAN); 24]);

        let daily = hourly_to_daily(&hourly).unwrap();

        let mean = TEMPS
            .iter()
            .enumerate()
            .filter(|(h, _)| *h != 3)
            .map(|(_, v)| (*v + 270.0) as f64)
            .sum::<f64>()
            / 23.0;
        assert_eq!(daily.value(band::T2M, 0, 0, 0), Some(mean as f32));
        assert_eq!(daily.value(band::T2M_MIN, 0, 0, 0), Some(275.0));
        assert_eq!(daily.value(band::TP, 0, 0, 0), None);
    }

    #[test]
    fn should_resample_hourly_to_daily() {
        // 48 hours: two calendar days
        let t2m: Vec<Option<f32>> = (0..48).map(|h| Some(TEMPS[h % 24] + 270.0)).collect();
        let tp: Vec<Option<f32>> = (0..48).map(|h| Some(0.25 * (h % 4) as f32)).collect();
        let hourly = hourly_fixture(t2m, tp);

        let daily = hourly_to_daily(&hourly).unwrap();

        assert_eq!(daily.times.len(), 2);
        assert_eq!(daily.times[1], midnight(day().succ_opt().unwrap()));
        // 6 cycles of 0 + 0.25 + 0.5 + 0.75
        assert_eq!(daily.value(band::TP, 0, 0, 0), Some(9.0));
        let mean = TEMPS.iter().map(|v| (*v + 270.0) as f64).sum::<f64>() / 24.0;
        assert_eq!(daily.value(band::T2M, 1, 0, 0), Some(mean as f32));
        assert_eq!(daily.value(band::T2M_MIN, 0, 0, 0), Some(275.0));
        assert_eq!(daily.value(band::T2M_MAX, 0, 0, 0), Some(290.0));
        assert!(daily.band(band::LAI_HV).is_err());
    }

    #[test]
    fn should_require_temperature_band() {
        let grid = Grid::new(vec![40.0], vec![-3.0]);
        let mut raster = Raster::new(grid, vec![midnight(day())]);
        raster.add_band(band::TP, vec![Some(0.0)]).unwrap();

        assert!(hourly_to_daily(&raster).is_err());
    }

    fn madrid_sun_times() -> SunTimes {
        SunTimes::build(&SunTimesRequest {
            bbox: BoundingBox {
                west: -3.0,
                east: -3.0,
                north: 40.0,
                south: 40.0,
            },
            nrows: 1,
            ncols: 1,
            year: 2020,
        })
        .unwrap()
    }

    #[test]
    fn should_mark_pixels_without_sun_times_undefined() {
        // second pixel far outside the single-pixel sun table
        let grid = Grid::new(vec![40.0], vec![-3.0, 10.0]);
        let times = (0..24)
            .map(|h| midnight(day()) + Duration::hours(h as i64))
            .collect();
        let mut hourly = Raster::new(grid, times);
        let t2m = TEMPS.iter().flat_map(|v| [Some(*v), Some(*v)]).collect();
        hourly.add_band(band::T2M, t2m).unwrap();
        hourly.add_band(band::TP, vec![Some(0.0); 48]).unwrap();

        let daily = aggregate_daily(&hourly, &madrid_sun_times()).unwrap();

        assert_eq!(daily.value(band::DIURNAL_TEMP_VARIATION, 0, 0, 0), Some(15.0));
        assert_eq!(daily.value(band::DIURNAL_TEMP_VARIATION, 0, 0, 1), None);
        assert_eq!(daily.value(band::MAX_NOCTURNAL_TEMP, 0, 0, 1), None);
        assert_eq!(daily.value(band::T2M_MAX, 0, 0, 1), Some(20.0));
    }

    #[test]
    fn should_fail_when_grid_misses_sun_times_entirely() {
        let sun = SunTimes::build(&SunTimesRequest {
            bbox: BoundingBox {
                west: 10.0,
                east: 10.0,
                north: 50.0,
                south: 50.0,
            },
            nrows: 1,
            ncols: 1,
            year: 2020,
        })
        .unwrap();
        let t2m = TEMPS.iter().map(|v| Some(*v)).collect();
        let hourly = hourly_fixture(t2m, vec![Some(0.0); 24]);

        let err = aggregate_daily(&hourly, &sun).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoSunTimesCoverage(1))
        ));
    }

    #[test]
    fn should_match_single_precision_coordinates_to_sun_times() {
        let sun = SunTimes::build(&SunTimesRequest {
            bbox: BoundingBox {
                west: -4.5,
                east: -3.5,
                north: 44.0,
                south: 43.0,
            },
            nrows: 11,
            ncols: 11,
            year: 2020,
        })
        .unwrap();
        let lats = (0..3).map(|i| (43.9f32 - 0.1 * i as f32) as f64).collect();
        let lons = (0..3).map(|i| (-3.9f32 + 0.1 * i as f32) as f64).collect();
        let grid = Grid::new(lats, lons);
        let times = (0..24)
            .map(|h| midnight(day()) + Duration::hours(h as i64))
            .collect();
        let mut hourly = Raster::new(grid, times);
        let t2m = TEMPS.iter().flat_map(|v| [Some(*v); 9]).collect();
        hourly.add_band(band::T2M, t2m).unwrap();
        hourly.add_band(band::TP, vec![Some(0.0); 24 * 9]).unwrap();

        let daily = aggregate_daily(&hourly, &sun).unwrap();

        let defined = daily
            .band(band::DIURNAL_TEMP_VARIATION)
            .unwrap()
            .iter()
            .filter(|v| v.is_some())
            .count();
        assert_eq!(defined, 9);
    }

    #[test]
    fn should_aggregate_with_sun_times_on_matching_grid() {
        let sun = madrid_sun_times();
        let t2m = TEMPS.iter().map(|v| Some(*v)).collect();
        let hourly = hourly_fixture(t2m, vec![Some(0.001); 24]);

        let daily = aggregate_daily(&hourly, &sun).unwrap();

        // Early July near Madrid: daylight roughly 04:45..19:50 UTC
        assert_eq!(daily.value(band::MIN_DIURNAL_TEMP, 0, 0, 0), Some(5.0));
        assert_eq!(daily.value(band::DIURNAL_TEMP_VARIATION, 0, 0, 0), Some(15.0));
        assert_eq!(daily.value(band::MAX_NOCTURNAL_TEMP, 0, 0, 0), Some(11.0));
    }
}
