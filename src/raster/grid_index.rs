//! Coordinate to array-index lookup, built once per grid.

use std::collections::HashMap;

/// Coordinates are matched after snapping to a micro-degree lattice.
const COORD_SCALE: f64 = 1e6;

pub fn coord_key(value: f64) -> i64 {
    (value * COORD_SCALE).round() as i64
}

#[derive(Debug, Clone)]
pub struct AxisIndex {
    positions: HashMap<i64, usize>,
    axis: Vec<f64>,
    /// Half the axis spacing, zero for single-value axes
    half_step: f64,
}

impl AxisIndex {
    pub fn new(axis: &[f64]) -> Self {
        let positions = axis
            .iter()
            .enumerate()
            .map(|(idx, &value)| (coord_key(value), idx))
            .collect();
        let half_step = match axis {
            [first, .., last] => (last - first).abs() / (axis.len() - 1) as f64 / 2.0,
            _ => 0.0,
        };

        AxisIndex {
            positions,
            axis: axis.to_vec(),
            half_step,
        }
    }

    /// Exact match on the micro-degree lattice.
    pub fn get(&self, value: f64) -> Option<usize> {
        self.positions.get(&coord_key(value)).copied()
    }

    /// Closest axis position, if `value` lies within half a step of it.
    pub fn nearest(&self, value: f64) -> Option<usize> {
        if let Some(idx) = self.get(value) {
            return Some(idx);
        }

        let descending = self.axis.first() > self.axis.last();
        let split = self
            .axis
            .partition_point(|&x| if descending { x > value } else { x < value });
        let distance = |idx: usize| (self.axis[idx] - value).abs();

        [split.checked_sub(1), Some(split)]
            .into_iter()
            .flatten()
            .filter(|&idx| idx < self.axis.len())
            .min_by(|&a, &b| distance(a).total_cmp(&distance(b)))
            .filter(|&idx| distance(idx) <= self.half_step + 1.0 / COORD_SCALE)
    }
}

/// Maps `(lat, lon)` to `(row, col)` for one grid.
#[derive(Debug, Clone)]
pub struct GridIndex {
    rows: AxisIndex,
    cols: AxisIndex,
}

impl GridIndex {
    pub fn new(latitudes: &[f64], longitudes: &[f64]) -> Self {
        GridIndex {
            rows: AxisIndex::new(latitudes),
            cols: AxisIndex::new(longitudes),
        }
    }

    pub fn locate(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        Some((self.rows.get(lat)?, self.cols.get(lon)?))
    }

    /// Pixel whose footprint contains `(lat, lon)`.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        Some((self.rows.nearest(lat)?, self.cols.nearest(lon)?))
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_locate_coordinates_despite_float_noise() {
        let lats: Vec<f64> = (0..91).map(|i| 44.0 - i as f64 * 0.1).collect();
        let lons: Vec<f64> = (0..151).map(|i| -10.0 + i as f64 * 0.1).collect();
        let index = GridIndex::new(&lats, &lons);

        assert_eq!(index.locate(44.0, -10.0), Some((0, 0)));
        assert_eq!(index.locate(40.3, 0.0), Some((37, 100)));
        assert_eq!(index.locate(35.0, 5.0), Some((90, 150)));
    }

    #[test]
    fn should_miss_coordinates_off_grid() {
        let index = GridIndex::new(&[1.0, 0.0], &[0.0, 1.0]);

        assert_eq!(index.locate(0.5, 0.0), None);
        assert_eq!(index.locate(0.0, 2.0), None);
    }

    #[test]
    fn should_find_nearest_pixel_for_single_precision_axes() {
        let lats: Vec<f64> = (0..91).map(|i| 44.0 - i as f64 * 0.1).collect();
        let lons: Vec<f64> = (0..151).map(|i| -10.0 + i as f64 * 0.1).collect();
        let index = GridIndex::new(&lats, &lons);

        let lat = (43.9f32 - 0.2) as f64;
        let lon = (-3.9f32 + 0.3) as f64;

        assert_eq!(index.locate(lat, lon), None);
        assert_eq!(index.nearest(lat, lon), Some((3, 64)));
    }

    #[test]
    fn should_reject_nearest_beyond_half_a_pixel() {
        let index = GridIndex::new(&[1.0, 0.0], &[0.0, 1.0]);

        assert_eq!(index.nearest(0.6, 0.4), Some((0, 0)));
        assert_eq!(index.nearest(1.6, 0.0), None);
        assert_eq!(index.nearest(0.0, -0.6), None);
        assert_eq!(GridIndex::new(&[40.0], &[-3.0]).nearest(40.0, -2.9), None);
    }
}
