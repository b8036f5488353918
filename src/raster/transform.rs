//! Affine georeferencing for north-up grids.

use std::fmt;

use anyhow::{anyhow, Result};

/// Affine transform in the usual `a, b, c, d, e, f` order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`,
/// where `(c, f)` is the outer corner of the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform with pixel size `(dx, dy)` and top-left corner `(west, north)`.
    pub fn north_up(west: f64, north: f64, dx: f64, dy: f64) -> Self {
        GeoTransform {
            a: dx,
            b: 0.0,
            c: west,
            d: 0.0,
            e: -dy,
            f: north,
        }
    }

    /// Derives the transform from pixel-centre axes (latitudes north to south,
    /// longitudes west to east). Single-pixel axes borrow the other axis'
    /// spacing.
    pub fn from_axes(latitudes: &[f64], longitudes: &[f64]) -> Self {
        let dx = spacing(longitudes);
        let dy = spacing(latitudes);
        let (dx, dy) = match (dx, dy) {
            (Some(dx), Some(dy)) => (dx, dy),
            (Some(dx), None) => (dx, dx),
            (None, Some(dy)) => (dy, dy),
            (None, None) => (1.0, 1.0),
        };
        let west = longitudes.first().copied().unwrap_or(0.0);
        let north = latitudes.first().copied().unwrap_or(0.0);

        GeoTransform::north_up(west - dx / 2.0, north + dy / 2.0, dx, dy)
    }

    pub fn from_metadata(value: &str) -> Result<Self> {
        let parts = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Invalid transform `{}`: {}", value, e))?;

        match parts[..] {
            [a, b, c, d, e, f] => Ok(GeoTransform { a, b, c, d, e, f }),
            _ => Err(anyhow!(
                "Invalid transform `{}`: expected 6 coefficients, found {}",
                value,
                parts.len()
            )),
        }
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

fn spacing(axis: &[f64]) -> Option<f64> {
    match axis {
        [first, .., last] => Some((last - first).abs() / (axis.len() - 1) as f64),
        _ => None,
    }
}

// -- Tests -------------------------------------------------------------------
