//! `towns` and `time` reference tables: loading and key resolution.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::{error::PipelineError, spatial::{Town, TownRow}};

use super::MeasurementRow;

const TOWN_CHUNK_SIZE: usize = 1000;

/// Inserts towns not yet present; returns how many were added.
pub async fn insert_towns(pool: &PgPool, towns: &[Town]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in towns.chunks(TOWN_CHUNK_SIZE) {
        let geometries = chunk
            .iter()
            .map(Town::geometry_geojson)
            .collect::<Result<Vec<_>>>()?;

        let mut qb =
            QueryBuilder::<Postgres>::new("INSERT INTO towns (town_name, province, region, geometry) ");
        qb.push_values(chunk.iter().zip(geometries), |mut b, (town, geometry)| {
            b.push_bind(&town.name)
                .push_bind(&town.province)
                .push_bind(&town.region)
                .push("ST_Multi(ST_SetSRID(ST_GeomFromGeoJSON(")
                .push_bind_unseparated(geometry)
                .push_unseparated("), 4326))");
        });
        qb.push(" ON CONFLICT (town_name) DO NOTHING");

        inserted += qb.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    Ok(inserted)
}

/// Inserts one `time` row per date of `start..=end`; returns how many were added.
pub async fn insert_dates(pool: &PgPool, start: NaiveDate, end: NaiveDate) -> Result<u64> {
    let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
    debug!("Inserting {} dates", dates.len());

    let result = sqlx::query(
        "INSERT INTO time (date) SELECT * FROM UNNEST($1::date[]) ON CONFLICT (date) DO NOTHING",
    )
    .bind(&dates)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Name and date to surrogate key maps for one load batch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceKeys {
    pub towns: HashMap<String, i32>,
    pub times: HashMap<NaiveDate, i32>,
}

impl ReferenceKeys {
    /// Every town, plus the dates of `start..=end`.
    pub async fn fetch(conn: &mut PgConnection, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let towns: Vec<(String, i32)> = sqlx::query_as("SELECT town_name, town_id FROM towns")
            .fetch_all(&mut *conn)
            .await?;
        let times: Vec<(NaiveDate, i32)> =
            sqlx::query_as("SELECT date, time_id FROM time WHERE date BETWEEN $1 AND $2")
                .bind(start)
                .bind(end)
                .fetch_all(&mut *conn)
                .await?;

        Ok(ReferenceKeys {
            towns: towns.into_iter().collect(),
            times: times.into_iter().collect(),
        })
    }

    /// Maps every row to its keys, or fails naming every unresolved town or date.
    pub fn resolve(&self, rows: Vec<TownRow>) -> Result<Vec<MeasurementRow>, PipelineError> {
        let missing_towns: BTreeSet<&str> = rows
            .iter()
            .filter(|r| !self.towns.contains_key(&r.town_name))
            .map(|r| r.town_name.as_str())
            .collect();
        if !missing_towns.is_empty() {
            return Err(PipelineError::UnresolvedTowns(
                missing_towns.into_iter().map(str::to_string).collect(),
            ));
        }

        let missing_dates: BTreeSet<NaiveDate> = rows
            .iter()
            .filter(|r| !self.times.contains_key(&r.date))
            .map(|r| r.date)
            .collect();
        if !missing_dates.is_empty() {
            return Err(PipelineError::UnresolvedDates(
                missing_dates.into_iter().collect(),
            ));
        }

        Ok(rows
            .into_iter()
            .map(|r| MeasurementRow {
                town_id: self.towns[&r.town_name],
                time_id: self.times[&r.date],
                values: r.values,
            })
            .collect())
    }
}

// -- Tests -------------------------------------------------------------------
