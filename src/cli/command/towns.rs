use std::path::Path;

use anyhow::Result;

use crate::{
    cli::create_spinner,
    config::{Config, DbConfig},
    db::{insert_towns, schema, Store},
    spatial::load_towns,
};

use super::DataLayout;

/// Creates the `towns` table and inserts the towns of `file`.
pub async fn towns(cfg: &Config, db: &DbConfig, file: Option<&Path>) -> Result<String> {
    let file = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| DataLayout::new(&cfg.data_dir).towns_file());
    let towns = load_towns(&file)?;

    Store::scoped(db, move |store| async move {
        schema::create_extensions(store.pool()).await?;
        schema::create_towns_table(store.pool()).await?;

        let bar = create_spinner(format!("Inserting {} towns...", towns.len()));
        let inserted = insert_towns(store.pool(), &towns).await?;
        bar.finish_with_message("Towns inserted");

        schema::create_towns_geometry_index(store.pool()).await?;

        Ok(format!(
            "{} of {} towns inserted from {}",
            inserted,
            towns.len(),
            file.display()
        ))
    })
    .await
}
