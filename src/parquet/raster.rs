//! Save and load rasters as long-format parquet files.
//!
//! One row per `(time, latitude, longitude)` with a nullable `Float32` column
//! per band. The CRS and affine transform travel in the file's key-value
//! metadata.

use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use anyhow::{anyhow, Result};
use arrow::{
    array::{
        Array, ArrayRef, Float32Array, Float32Builder, Float64Array, Float64Builder,
        TimestampSecondArray, TimestampSecondBuilder,
    },
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, NaiveDateTime};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression, ZstdLevel},
    file::{metadata::KeyValue, properties::WriterProperties},
};

use crate::{
    error::PipelineError,
    raster::{grid_index::coord_key, GeoTransform, Grid, GridIndex, Raster, EPSG_4326},
};

pub const TIME_COLUMN: &str = "time";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";
const CRS_KEY: &str = "crs";
const TRANSFORM_KEY: &str = "transform";

const CHUNK_SIZE: usize = 100_000;

pub fn save_raster(raster: &Raster, file_path: &Path) -> Result<()> {
    save_raster_with_metadata(raster, file_path, &[])
}

/// Like [`save_raster`] with extra key-value metadata entries.
pub fn save_raster_with_metadata(
    raster: &Raster,
    file_path: &Path,
    extra: &[(&str, &str)],
) -> Result<()> {
    let mut fields = vec![
        Field::new(
            TIME_COLUMN,
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        ),
        Field::new(LATITUDE_COLUMN, DataType::Float64, false),
        Field::new(LONGITUDE_COLUMN, DataType::Float64, false),
    ];
    for name in raster.bands.keys() {
        fields.push(Field::new(name, DataType::Float32, true));
    }
    let schema = Arc::new(Schema::new(fields));

    let mut key_values = vec![
        KeyValue::new(CRS_KEY.to_string(), raster.grid.crs.clone()),
        KeyValue::new(TRANSFORM_KEY.to_string(), raster.grid.transform.to_string()),
    ];
    for (key, value) in extra {
        key_values.push(KeyValue::new(key.to_string(), value.to_string()));
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_dictionary_enabled(true)
        .set_key_value_metadata(Some(key_values))
        .build();

    let file = File::create(file_path)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let bands: Vec<&Vec<Option<f32>>> = raster.bands.values().collect();
    let total_rows = raster.times.len() * raster.grid.len();
    let plane = raster.grid.len();

    let mut start = 0;
    while start < total_rows {
        let end = (start + CHUNK_SIZE).min(total_rows);

        let mut time_builder = TimestampSecondBuilder::with_capacity(end - start);
        let mut lat_builder = Float64Builder::with_capacity(end - start);
        let mut lon_builder = Float64Builder::with_capacity(end - start);
        let mut band_builders: Vec<Float32Builder> = bands
            .iter()
            .map(|_| Float32Builder::with_capacity(end - start))
            .collect();

        for idx in start..end {
            let (t, pixel) = (idx / plane, idx % plane);
            let (lat, lon) = raster.grid.pixel_coords(pixel);

            time_builder.append_value(raster.times[t].and_utc().timestamp());
            lat_builder.append_value(lat);
            lon_builder.append_value(lon);
            for (builder, values) in band_builders.iter_mut().zip(&bands) {
                builder.append_option(values[idx]);
            }
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(time_builder.finish()),
            Arc::new(lat_builder.finish()),
            Arc::new(lon_builder.finish()),
        ];
        for mut builder in band_builders {
            columns.push(Arc::new(builder.finish()));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        writer.write(&batch)?;

        start = end;
    }

    writer.close()?;

    Ok(())
}

pub fn load_raster(file_path: &Path) -> Result<Raster> {
    let (raster, _) = load_raster_with_metadata(file_path)?;
    Ok(raster)
}

/// Loads a raster plus every key-value metadata entry of the file.
pub fn load_raster_with_metadata(file_path: &Path) -> Result<(Raster, HashMap<String, String>)> {
    let file = File::open(file_path)
        .map_err(|e| anyhow!("Failed to open {}: {}", file_path.display(), e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let metadata: HashMap<String, String> = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    let band_names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| {
            name != TIME_COLUMN && name != LATITUDE_COLUMN && name != LONGITUDE_COLUMN
        })
        .collect();

    let reader = builder.build()?;

    let mut times: Vec<i64> = Vec::new();
    let mut lats: Vec<f64> = Vec::new();
    let mut lons: Vec<f64> = Vec::new();
    let mut values: Vec<Vec<Option<f32>>> = vec![Vec::new(); band_names.len()];

    for batch in reader {
        let batch = batch?;

        let time_array = column::<TimestampSecondArray>(&batch, TIME_COLUMN)?;
        let lat_array = column::<Float64Array>(&batch, LATITUDE_COLUMN)?;
        let lon_array = column::<Float64Array>(&batch, LONGITUDE_COLUMN)?;
        times.extend(time_array.values().iter().copied());
        lats.extend(lat_array.values().iter().copied());
        lons.extend(lon_array.values().iter().copied());

        for (name, dest) in band_names.iter().zip(values.iter_mut()) {
            let array = column::<Float32Array>(&batch, name)?;
            // NaN marks missing samples
            dest.extend(array.iter().map(|v| v.filter(|x| x.is_finite())));
        }
    }

    let time_axis = sorted_unique_times(&times);
    let lat_axis = sorted_unique_coords(&lats, true);
    let lon_axis = sorted_unique_coords(&lons, false);

    let mut grid = Grid::new(lat_axis, lon_axis);
    if grid.is_empty() {
        return Err(PipelineError::InvalidRaster(format!(
            "{} holds no samples",
            file_path.display()
        ))
        .into());
    }
    if let Some(crs) = metadata.get(CRS_KEY) {
        grid.crs = crs.clone();
    } else {
        grid.crs = EPSG_4326.to_string();
    }
    if let Some(transform) = metadata.get(TRANSFORM_KEY) {
        grid.transform = GeoTransform::from_metadata(transform)?;
    }

    let index = grid.index();
    let time_index: HashMap<i64, usize> = time_axis
        .iter()
        .enumerate()
        .map(|(idx, &t)| (t, idx))
        .collect();

    let plane = grid.len();
    let cols = grid.cols();
    let total = time_axis.len() * plane;
    let mut placed: Vec<Vec<Option<f32>>> = vec![vec![None; total]; band_names.len()];

    for row in 0..times.len() {
        let t = time_index[&times[row]];
        let (r, c) = index.locate(lats[row], lons[row]).ok_or_else(|| {
            PipelineError::InvalidRaster(format!(
                "coordinate ({}, {}) off the grid",
                lats[row], lons[row]
            ))
        })?;
        let dest = t * plane + r * cols + c;
        for (band, source) in placed.iter_mut().zip(&values) {
            band[dest] = source[row];
        }
    }

    let times = time_axis
        .into_iter()
        .map(to_naive)
        .collect::<Result<Vec<_>>>()?;
    let mut raster = Raster::new(grid, times);
    for (name, band) in band_names.iter().zip(placed) {
        raster.add_band(name, band)?;
    }

    Ok((raster, metadata))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            PipelineError::InvalidRaster(format!("column `{}` missing or mistyped", name)).into()
        })
}

fn sorted_unique_times(times: &[i64]) -> Vec<i64> {
    let mut axis = times.to_vec();
    axis.sort_unstable();
    axis.dedup();
    axis
}

fn sorted_unique_coords(coords: &[f64], descending: bool) -> Vec<f64> {
    let mut axis = coords.to_vec();
    axis.sort_by(|a, b| a.total_cmp(b));
    axis.dedup_by(|a, b| coord_key(*a) == coord_key(*b));
    if descending {
        axis.reverse();
    }
    axis
}

fn to_naive(seconds: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow!("Timestamp {} out of range", seconds))
}

// -- Tests -------------------------------------------------------------------
