//! Sunrise and sunset from the NOAA solar position equations.
//!
//! Times are returned as seconds after 00:00 UTC of the requested date.

use chrono::{Datelike, NaiveDate};

/// Solar altitude at sunrise/sunset: refraction plus the solar semi-diameter.
const SUNRISE_ZENITH_DEG: f64 = 90.833;
const MINUTES_PER_DAY: f64 = 1440.0;
/// `num_days_from_ce` of 2000-01-01
const J2000_DAYS_FROM_CE: i32 = 730_120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunEvents {
    pub sunrise: u32,
    pub sunset: u32,
}

/// `None` during polar day or polar night.
pub fn sun_events(date: NaiveDate, latitude: f64, longitude: f64) -> Option<SunEvents> {
    let jc = julian_century(date);
    let (declination, eq_time) = declination_and_equation_of_time(jc);

    let lat = latitude.to_radians();
    let cos_ha = SUNRISE_ZENITH_DEG.to_radians().cos() / (lat.cos() * declination.cos())
        - lat.tan() * declination.tan();
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let hour_angle = cos_ha.acos().to_degrees();

    let solar_noon = 720.0 - 4.0 * longitude - eq_time;
    let sunrise = solar_noon - 4.0 * hour_angle;
    let sunset = solar_noon + 4.0 * hour_angle;

    Some(SunEvents {
        sunrise: minutes_to_seconds_of_day(sunrise),
        sunset: minutes_to_seconds_of_day(sunset),
    })
}

/// Julian centuries since J2000.0, taken at noon UTC of `date`.
fn julian_century(date: NaiveDate) -> f64 {
    let days = (date.num_days_from_ce() - J2000_DAYS_FROM_CE) as f64;
    days / 36525.0
}

/// Solar declination (radians) and equation of time (minutes).
fn declination_and_equation_of_time(jc: f64) -> (f64, f64) {
    let mean_long = (280.46646 + jc * (36000.76983 + jc * 0.0003032)).rem_euclid(360.0);
    let mean_anomaly = 357.52911 + jc * (35999.05029 - 0.0001537 * jc);
    let eccentricity = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);

    let m = mean_anomaly.to_radians();
    let center = m.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * m).sin() * 0.000289;
    let true_long = mean_long + center;

    let omega = (125.04 - 1934.136 * jc).to_radians();
    let apparent_long = (true_long - 0.00569 - 0.00478 * omega.sin()).to_radians();

    let mean_obliquity = 23.0
        + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eq_time = 4.0
        * (y * (2.0 * l0).sin() - 2.0 * eccentricity * m.sin()
            + 4.0 * eccentricity * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * eccentricity * eccentricity * (2.0 * m).sin())
        .to_degrees();

    (declination, eq_time)
}

fn minutes_to_seconds_of_day(minutes: f64) -> u32 {
    (minutes.rem_euclid(MINUTES_PER_DAY) * 60.0).round() as u32 % 86_400
}

// -- Tests -------------------------------------------------------------------
