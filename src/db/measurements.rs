use anyhow::{ensure, Result};
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::Source;

/// Postgres accepts at most 65535 bind parameters per statement.
const MAX_BINDS: usize = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub town_id: i32,
    pub time_id: i32,
    /// In the order of [`Source::columns`]
    pub values: Vec<Option<f32>>,
}

fn insert_prefix(source: Source) -> String {
    format!(
        "INSERT INTO {} (town_id, time_id, {}) ",
        source.table(),
        source.columns().join(", ")
    )
}

/// Rows per statement so that binds stay under the Postgres limit.
pub fn chunk_size(source: Source) -> usize {
    MAX_BINDS / (2 + source.columns().len())
}

/// Bulk inserts `rows` in a single transaction. Rows already stored for the
/// same (town, date) are left untouched. Returns the number of new rows.
pub async fn insert_measurements(
    conn: &mut PgConnection,
    source: Source,
    rows: &[MeasurementRow],
) -> Result<u64> {
    let ncols = source.columns().len();
    for row in rows {
        ensure!(
            row.values.len() == ncols,
            "Measurement row has {} values, {} expects {}",
            row.values.len(),
            source.table(),
            ncols
        );
    }

    let mut transaction = sqlx::Connection::begin(&mut *conn).await?;
    let mut inserted = 0;

    for chunk in rows.chunks(chunk_size(source)) {
        let mut qb = QueryBuilder::<Postgres>::new(insert_prefix(source));
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.town_id).push_bind(row.time_id);
            for value in &row.values {
                b.push_bind(*value);
            }
        });
        qb.push(" ON CONFLICT (town_id, time_id) DO NOTHING");

        inserted += qb.build().execute(&mut *transaction).await?.rows_affected();
    }

    transaction.commit().await?;

    Ok(inserted)
}

// -- Tests -------------------------------------------------------------------
