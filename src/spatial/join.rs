//! Pixel footprint to town join.

use geo::{coord, Intersects, Rect};
use tracing::debug;

use crate::raster::Grid;

use super::towns::Town;

/// ERA5-Land grid spacing in degrees.
pub const ERA5_PIXEL_SIZE: f64 = 0.1;
/// MODIS 250 m grid spacing in degrees.
pub const MODIS_PIXEL_SIZE: f64 = 0.002083333333;

/// How a pixel footprint is matched against a town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum JoinPredicate {
    /// Footprint overlaps the town's bounding rectangle
    #[default]
    BoundingBox,
    /// Footprint intersects the town polygon
    Intersects,
}

/// Flat pixel indices (within one time slice) matched to a town.
#[derive(Debug, Clone, PartialEq)]
pub struct TownPixels {
    pub town: usize,
    pub pixels: Vec<usize>,
}

/// Square footprint of side `pixel_size` centred on a pixel.
pub fn footprint(lat: f64, lon: f64, pixel_size: f64) -> Rect<f64> {
    let h = pixel_size / 2.0;
    Rect::new(
        coord! { x: lon - h, y: lat - h },
        coord! { x: lon + h, y: lat + h },
    )
}

/// Matches every town against the grid's pixel footprints.
///
/// Towns without any matching pixel are left out of the result.
pub fn spatial_join(
    grid: &Grid,
    pixel_size: f64,
    towns: &[Town],
    predicate: JoinPredicate,
) -> Vec<TownPixels> {
    let h = pixel_size / 2.0;
    let cols = grid.cols();
    let mut joined = Vec::new();

    for (idx, town) in towns.iter().enumerate() {
        let (min, max) = (town.bbox.min(), town.bbox.max());

        // longitudes ascend, latitudes descend
        let col_start = grid.longitudes.partition_point(|&x| x + h < min.x);
        let col_end = grid.longitudes.partition_point(|&x| x - h <= max.x);
        let row_start = grid.latitudes.partition_point(|&y| y - h > max.y);
        let row_end = grid.latitudes.partition_point(|&y| y + h >= min.y);

        let mut pixels = Vec::new();
        for row in row_start..row_end {
            for col in col_start..col_end {
                let matched = match predicate {
                    JoinPredicate::BoundingBox => true,
                    JoinPredicate::Intersects => {
                        let rect = footprint(grid.latitudes[row], grid.longitudes[col], pixel_size);
                        town.geometry.iter().any(|polygon| rect.intersects(polygon))
                    }
                };
                if matched {
                    pixels.push(row * cols + col);
                }
            }
        }

        if !pixels.is_empty() {
            joined.push(TownPixels { town: idx, pixels });
        }
    }

    debug!(
        "{} of {} towns matched with {:?}",
        joined.len(),
        towns.len(),
        predicate
    );

    joined
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use geo::{polygon, MultiPolygon};

    use super::*;

    fn grid() -> Grid {
        // 0.1 degree pixels centred on 40.2..39.8, -3.2..-2.8
        Grid::new(
            vec![40.2, 40.1, 40.0, 39.9, 39.8],
            vec![-3.2, -3.1, -3.0, -2.9, -2.8],
        )
    }

    fn town(name: &str, polygon: geo::Polygon<f64>) -> Town {
        Town::new(name.to_string(), None, None, MultiPolygon(vec![polygon])).unwrap()
    }

    /// Right triangle hugging the south-west corner of the grid.
    fn triangle() -> Town {
        town(
            "triangle",
            polygon![
                (x: -3.24, y: 39.76),
                (x: -2.96, y: 39.76),
                (x: -3.24, y: 40.04),
                (x: -3.24, y: 39.76),
            ],
        )
    }

    #[test]
    fn should_match_pixels_overlapping_bounding_box() {
        let square = town(
            "square",
            polygon![
                (x: -3.04, y: 39.96),
                (x: -2.96, y: 39.96),
                (x: -2.96, y: 40.04),
                (x: -3.04, y: 40.04),
                (x: -3.04, y: 39.96),
            ],
        );

        let joined = spatial_join(&grid(), ERA5_PIXEL_SIZE, &[square], JoinPredicate::BoundingBox);

        assert_eq!(joined.len(), 1);
        // centre pixel only: row 2, col 2
        assert_eq!(joined[0].pixels, vec![12]);
    }

    #[test]
    fn should_drop_corner_pixels_with_exact_intersection() {
        let towns = [triangle()];

        let bbox = spatial_join(&grid(), ERA5_PIXEL_SIZE, &towns, JoinPredicate::BoundingBox);
        let exact = spatial_join(&grid(), ERA5_PIXEL_SIZE, &towns, JoinPredicate::Intersects);

        // rows 2..5, cols 0..3
        assert_eq!(bbox[0].pixels.len(), 9);
        assert!(exact[0].pixels.len() < bbox[0].pixels.len());
        // north-east corner pixel (row 2, col 2) lies outside the hypotenuse
        assert!(bbox[0].pixels.contains(&12));
        assert!(!exact[0].pixels.contains(&12));
        assert!(exact[0].pixels.contains(&20));
    }

    #[test]
    fn should_skip_towns_outside_grid() {
        let far = town(
            "far",
            polygon![
                (x: 10.0, y: 50.0),
                (x: 10.1, y: 50.0),
                (x: 10.1, y: 50.1),
                (x: 10.0, y: 50.0),
            ],
        );

        let towns = [far, triangle()];
        let joined = spatial_join(&grid(), ERA5_PIXEL_SIZE, &towns, JoinPredicate::default());

        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].town, 1);
    }
}
