//! In-memory gridded time series.
//!
//! A [`Raster`] holds one [`Grid`], a time axis and any number of named bands.
//! Each band is stored flat in `[time][row][col]` order; `None` marks an
//! undefined sample.

pub mod grid_index;
pub mod transform;

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub use grid_index::GridIndex;
pub use transform::GeoTransform;

use crate::error::PipelineError;

pub const EPSG_4326: &str = "EPSG:4326";

/// Band names shared by the ERA5 stages. They double as measurement column names.
pub mod band {
    pub const TP: &str = "tp";
    pub const T2M: &str = "t2m";
    pub const T2M_MIN: &str = "t2m_min";
    pub const T2M_MAX: &str = "t2m_max";
    pub const LAI_HV: &str = "lai_hv";
    pub const LAI_LV: &str = "lai_lv";
    pub const DIURNAL_TEMP_VARIATION: &str = "diurnal_temp_variation";
    pub const MAX_NOCTURNAL_TEMP: &str = "max_nocturnal_temp";
    pub const MIN_DIURNAL_TEMP: &str = "min_diurnal_temp";
    pub const SUNRISE: &str = "sunrise";
    pub const SUNSET: &str = "sunset";
    pub const NDVI: &str = "ndvi";
    pub const VI_QUALITY: &str = "vi_quality";
}

pub type Band = Vec<Option<f32>>;

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Pixel-centre latitudes, north to south
    pub latitudes: Vec<f64>,
    /// Pixel-centre longitudes, west to east
    pub longitudes: Vec<f64>,
    pub transform: GeoTransform,
    pub crs: String,
}

impl Grid {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        let transform = GeoTransform::from_axes(&latitudes, &longitudes);
        Grid {
            latitudes,
            longitudes,
            transform,
            crs: EPSG_4326.to_string(),
        }
    }

    pub fn rows(&self) -> usize {
        self.latitudes.len()
    }

    pub fn cols(&self) -> usize {
        self.longitudes.len()
    }

    /// Number of pixels in one time slice.
    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pixel(&self, idx: usize) -> (usize, usize) {
        (idx / self.cols(), idx % self.cols())
    }

    pub fn pixel_coords(&self, idx: usize) -> (f64, f64) {
        let (row, col) = self.pixel(idx);
        (self.latitudes[row], self.longitudes[col])
    }

    pub fn index(&self) -> GridIndex {
        GridIndex::new(&self.latitudes, &self.longitudes)
    }

    pub fn same_shape(&self, other: &Grid) -> bool {
        self.rows() == other.rows()
            && self.cols() == other.cols()
            && self
                .latitudes
                .iter()
                .zip(&other.latitudes)
                .all(|(a, b)| grid_index::coord_key(*a) == grid_index::coord_key(*b))
            && self
                .longitudes
                .iter()
                .zip(&other.longitudes)
                .all(|(a, b)| grid_index::coord_key(*a) == grid_index::coord_key(*b))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub grid: Grid,
    pub times: Vec<NaiveDateTime>,
    pub bands: BTreeMap<String, Band>,
}

impl Raster {
    pub fn new(grid: Grid, times: Vec<NaiveDateTime>) -> Self {
        Raster {
            grid,
            times,
            bands: BTreeMap::new(),
        }
    }

    fn expected_len(&self) -> usize {
        self.times.len() * self.grid.len()
    }

    pub fn add_band(&mut self, name: &str, values: Band) -> Result<()> {
        if values.len() != self.expected_len() {
            return Err(PipelineError::InvalidRaster(format!(
                "band `{}` has {} values, expected {}",
                name,
                values.len(),
                self.expected_len()
            ))
            .into());
        }
        self.bands.insert(name.to_string(), values);

        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Band, PipelineError> {
        self.bands
            .get(name)
            .ok_or_else(|| PipelineError::MissingBand(name.to_string()))
    }

    pub fn band_mut(&mut self, name: &str) -> Result<&mut Band, PipelineError> {
        self.bands
            .get_mut(name)
            .ok_or_else(|| PipelineError::MissingBand(name.to_string()))
    }

    /// One time slice of a band.
    pub fn plane(&self, name: &str, t: usize) -> Result<&[Option<f32>], PipelineError> {
        let n = self.grid.len();
        Ok(&self.band(name)?[t * n..(t + 1) * n])
    }

    pub fn value(&self, name: &str, t: usize, row: usize, col: usize) -> Option<f32> {
        let n = self.grid.len();
        self.bands
            .get(name)
            .and_then(|b| b.get(t * n + row * self.grid.cols() + col).copied().flatten())
    }

    /// Multiplies every defined sample of a band by `factor`.
    pub fn scale_band(&mut self, name: &str, factor: f32) -> Result<(), PipelineError> {
        for v in self.band_mut(name)?.iter_mut().flatten() {
            *v *= factor;
        }

        Ok(())
    }

    /// Copies out a single time slice as its own raster.
    pub fn select_time(&self, t: usize) -> Raster {
        let n = self.grid.len();
        let bands = self
            .bands
            .iter()
            .map(|(name, values)| (name.clone(), values[t * n..(t + 1) * n].to_vec()))
            .collect();

        Raster {
            grid: self.grid.clone(),
            times: vec![self.times[t]],
            bands,
        }
    }
}

// -- Tests -------------------------------------------------------------------
