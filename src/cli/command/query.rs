use std::{fs, path::Path};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::{
    config::DbConfig,
    db::{query::to_feature_collection, query_measurements, valid_dates, Store, Variable},
};

/// Town values of `variable` on `date` as a GeoJSON FeatureCollection,
/// written to `output` or returned for printing.
pub async fn query(
    db: &DbConfig,
    variable: Variable,
    date: NaiveDate,
    output: Option<&Path>,
) -> Result<String> {
    let rows = Store::scoped(db, move |store| async move {
        query_measurements(store.pool(), variable, date).await
    })
    .await?;
    info!("{} towns with `{}` on {}", rows.len(), variable, date);

    let collection = to_feature_collection(variable, &rows)?;
    let text = serde_json::to_string(&collection)?;

    match output {
        Some(path) => {
            fs::write(path, text)?;
            Ok(format!("{} towns written to `{}`", rows.len(), path.display()))
        }
        None => Ok(text),
    }
}

/// Dates with `variable` measurements, one per line.
pub async fn dates(db: &DbConfig, variable: Variable) -> Result<String> {
    let dates = Store::scoped(db, move |store| async move {
        valid_dates(store.pool(), variable).await
    })
    .await?;
    info!("{} dates with `{}`", dates.len(), variable);

    Ok(dates
        .iter()
        .map(NaiveDate::to_string)
        .collect::<Vec<_>>()
        .join("\n"))
}
