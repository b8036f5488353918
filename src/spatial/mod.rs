//! Town boundaries, pixel-to-town joins and per-town averages.

pub mod join;
pub mod towns;
pub mod zonal;

pub use join::{spatial_join, JoinPredicate, ERA5_PIXEL_SIZE, MODIS_PIXEL_SIZE};
pub use towns::{load_towns, Town};
pub use zonal::{town_means, TownRow};
