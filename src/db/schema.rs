//! Table, hypertable and index DDL.
//!
//! Each statement runs and commits on its own, so a failure leaves every
//! earlier object in place and a rerun picks up where it stopped.

use anyhow::Result;
use sqlx::PgPool;
use tracing::debug;

use super::Source;

/// Days of `time_id` per hypertable chunk.
pub const CHUNK_TIME_INTERVAL: i32 = 365;

async fn execute(pool: &PgPool, sql: &str) -> Result<()> {
    debug!("{}", sql.trim());
    sqlx::query(sql).execute(pool).await?;
    Ok(())
}

pub async fn create_extensions(pool: &PgPool) -> Result<()> {
    execute(pool, "CREATE EXTENSION IF NOT EXISTS postgis").await?;
    execute(pool, "CREATE EXTENSION IF NOT EXISTS timescaledb").await?;
    Ok(())
}

pub async fn create_towns_table(pool: &PgPool) -> Result<()> {
    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS towns (
            town_id   SERIAL PRIMARY KEY,
            town_name TEXT NOT NULL UNIQUE,
            province  TEXT,
            region    TEXT,
            geometry  geometry(MultiPolygon, 4326) NOT NULL
        )
        "#,
    )
    .await
}

pub async fn create_towns_geometry_index(pool: &PgPool) -> Result<()> {
    execute(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_towns_geometry ON towns USING GIST (geometry)",
    )
    .await
}

pub async fn create_time_table(pool: &PgPool) -> Result<()> {
    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS time (
            time_id SERIAL PRIMARY KEY,
            date    DATE NOT NULL UNIQUE
        )
        "#,
    )
    .await
}

fn measurements_ddl(source: Source) -> String {
    let columns: String = source
        .columns()
        .iter()
        .map(|c| format!("            {} REAL,\n", c))
        .collect();

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            measurement_id BIGSERIAL,
            town_id INTEGER NOT NULL REFERENCES towns (town_id),
            time_id INTEGER NOT NULL REFERENCES time (time_id),
{columns}            UNIQUE (town_id, time_id)
        )
        "#,
        table = source.table(),
        columns = columns,
    )
}

/// Creates the measurement table of `source` and turns it into a hypertable.
pub async fn create_measurements_table(pool: &PgPool, source: Source) -> Result<()> {
    execute(pool, &measurements_ddl(source)).await?;
    execute(
        pool,
        &format!(
            "SELECT create_hypertable('{}', 'time_id', chunk_time_interval => {}, if_not_exists => TRUE)",
            source.table(),
            CHUNK_TIME_INTERVAL
        ),
    )
    .await
}

pub async fn drop_town_index(pool: &PgPool, source: Source) -> Result<()> {
    execute(pool, &format!("DROP INDEX IF EXISTS {}", source.town_index())).await
}

pub async fn create_town_index(pool: &PgPool, source: Source) -> Result<()> {
    execute(
        pool,
        &format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (town_id)",
            source.town_index(),
            source.table()
        ),
    )
    .await
}

// -- Tests -------------------------------------------------------------------
