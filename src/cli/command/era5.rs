use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Result};
use futures::{stream, StreamExt};
use tracing::info;

use crate::{
    cli::create_progress_bar,
    config::{Config, DbConfig},
    db::{schema, store_town_rows, Source, Store},
    parquet,
    raster::band,
    spatial::{
        load_towns, spatial_join, town_means, JoinPredicate, Town, TownRow, ERA5_PIXEL_SIZE,
    },
};

use super::{list_parquet_files, BatchReport, DataLayout, Outcome};

/// ERA5 precipitation is stored in metres, measurements in millimetres.
const METRES_TO_MILLIMETRES: f32 = 1000.0;

/// Loads every anomaly file into `era5_measurements`.
pub async fn load_era5(
    cfg: &Config,
    db: &DbConfig,
    towns_file: Option<&Path>,
    predicate: JoinPredicate,
) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let towns_file = towns_file.map(Path::to_path_buf).unwrap_or_else(|| layout.towns_file());
    let towns = Arc::new(load_towns(&towns_file)?);
    let files = list_parquet_files(&layout.anomaly_dir())?;
    let workers = db.pool_max as usize;

    info!(
        "Loading {} anomaly files against {} towns ({:?}, {} workers)",
        files.len(),
        towns.len(),
        predicate,
        workers
    );

    Store::scoped(db, move |store| async move {
        schema::create_measurements_table(store.pool(), Source::Era5).await?;
        schema::drop_town_index(store.pool(), Source::Era5).await?;

        let pb = create_progress_bar(files.len() as u64, "Loading ERA5 measurements".to_string());
        let mut results = stream::iter(files)
            .map(|file| {
                let store = store.clone();
                let towns = Arc::clone(&towns);
                async move {
                    let result = load_file(&store, &file, towns, predicate).await;
                    (file, result)
                }
            })
            .buffer_unordered(workers);

        let mut report = BatchReport::default();
        while let Some((file, result)) = results.next().await {
            report.record(file.display(), result, &pb);
        }
        pb.finish_with_message("ERA5 measurements loaded");

        schema::create_town_index(store.pool(), Source::Era5).await?;

        report.into_result("anomaly files")
    })
    .await
}

async fn load_file(
    store: &Store,
    file: &Path,
    towns: Arc<Vec<Town>>,
    predicate: JoinPredicate,
) -> Result<Outcome> {
    let path = file.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || town_rows(&path, &towns, predicate))
        .await
        .map_err(|e| anyhow!("Worker failed: {}", e))??;

    let mut conn = store.pool().acquire().await?;
    let inserted = store_town_rows(&mut conn, Source::Era5, rows).await?;

    Ok(Outcome::Inserted(inserted))
}

/// Town averages of one anomaly file, precipitation in millimetres.
pub fn town_rows(file: &Path, towns: &[Town], predicate: JoinPredicate) -> Result<Vec<TownRow>> {
    let mut raster = parquet::load_raster(file)?;
    raster.scale_band(band::TP, METRES_TO_MILLIMETRES)?;

    let join = spatial_join(&raster.grid, ERA5_PIXEL_SIZE, towns, predicate);
    town_means(&raster, &join, towns, Source::Era5.columns())
}

// -- Tests -------------------------------------------------------------------
