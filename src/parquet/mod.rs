//! Handles serialising rasters to and from disk in the _parquet_ file format.

pub mod raster;

pub use raster::{load_raster, load_raster_with_metadata, save_raster, save_raster_with_metadata};
