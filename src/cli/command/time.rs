use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::{
    cli::create_spinner,
    config::DbConfig,
    db::{insert_dates, schema, Store},
};

/// Creates the `time` table and inserts every date of `start..=end`.
pub async fn time(db: &DbConfig, start: NaiveDate, end: NaiveDate) -> Result<String> {
    if end < start {
        bail!("End date {} precedes start date {}", end, start);
    }

    Store::scoped(db, move |store| async move {
        schema::create_time_table(store.pool()).await?;

        let bar = create_spinner(format!("Inserting dates {} to {}...", start, end));
        let inserted = insert_dates(store.pool(), start, end).await?;
        bar.finish_with_message("Dates inserted");

        Ok(format!("{} dates inserted", inserted))
    })
    .await
}
