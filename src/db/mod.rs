//! PostgreSQL + PostGIS + TimescaleDB measurement store.

pub mod measurements;
pub mod query;
pub mod reference;
pub mod schema;

use std::future::Future;

use anyhow::{anyhow, Result};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use tracing::info;

use crate::{config::DbConfig, raster::band, spatial::TownRow};

pub use measurements::{insert_measurements, MeasurementRow};
pub use query::{query_measurements, valid_dates, Variable};
pub use reference::{insert_dates, insert_towns, ReferenceKeys};

/// Owned connection pool, passed explicitly into each stage.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        info!("Connecting to {}", cfg.masked_url());

        let pool = PgPoolOptions::new()
            .max_connections(cfg.pool_max)
            .connect_with(cfg.connect_options())
            .await
            .map_err(|e| anyhow!("Failed to connect to database '{}': {}", cfg.masked_url(), e))?;

        Ok(Store { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Opens a store for the duration of `f` and closes it on every exit path.
    pub async fn scoped<F, Fut, T>(cfg: &DbConfig, f: F) -> Result<T>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let store = Store::connect(cfg).await?;
        let result = f(store.clone()).await;
        store.close().await;
        result
    }
}

/// Resolves town/date keys for `rows` and bulk inserts them into the
/// `source` table. Nothing is inserted when any key is missing.
pub async fn store_town_rows(
    conn: &mut PgConnection,
    source: Source,
    rows: Vec<TownRow>,
) -> Result<u64> {
    let (Some(start), Some(end)) = (
        rows.iter().map(|r| r.date).min(),
        rows.iter().map(|r| r.date).max(),
    ) else {
        return Ok(0);
    };

    let keys = ReferenceKeys::fetch(&mut *conn, start, end).await?;
    let rows = keys.resolve(rows)?;
    insert_measurements(conn, source, &rows).await
}

/// Measurement source: one fact table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Era5,
    Modis,
}

const ERA5_COLUMNS: [&str; 7] = [
    band::TP,
    band::T2M,
    band::T2M_MIN,
    band::T2M_MAX,
    band::DIURNAL_TEMP_VARIATION,
    band::MAX_NOCTURNAL_TEMP,
    band::MIN_DIURNAL_TEMP,
];

const MODIS_COLUMNS: [&str; 1] = [band::NDVI];

impl Source {
    pub fn table(&self) -> &'static str {
        match self {
            Source::Era5 => "era5_measurements",
            Source::Modis => "modis_measurements",
        }
    }

    /// Value columns, in insert order. They match the raster band names.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Source::Era5 => &ERA5_COLUMNS,
            Source::Modis => &MODIS_COLUMNS,
        }
    }

    pub fn town_index(&self) -> String {
        format!("idx_{}_town_id", self.table())
    }
}
