use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::{
    cli::create_progress_bar,
    config::{Config, DbConfig},
    db::{schema, store_town_rows, Source, Store},
    modis::mask_unusable,
    parquet,
    spatial::{
        load_towns, spatial_join, town_means, JoinPredicate, Town, TownRow, MODIS_PIXEL_SIZE,
    },
};

use super::{list_parquet_files, BatchReport, DataLayout, Outcome};

/// Loads the single-date MODIS files into `modis_measurements`, one file at a time.
pub async fn load_modis(
    cfg: &Config,
    db: &DbConfig,
    towns_file: Option<&Path>,
    predicate: JoinPredicate,
) -> Result<String> {
    let layout = DataLayout::new(&cfg.data_dir);
    let towns_file = towns_file.map(Path::to_path_buf).unwrap_or_else(|| layout.towns_file());
    let towns = load_towns(&towns_file)?;
    let files = list_parquet_files(&layout.modis_dir())?;

    info!(
        "Loading {} MODIS files against {} towns ({:?})",
        files.len(),
        towns.len(),
        predicate
    );

    Store::scoped(db, move |store| async move {
        schema::create_measurements_table(store.pool(), Source::Modis).await?;
        schema::drop_town_index(store.pool(), Source::Modis).await?;

        let pb = create_progress_bar(files.len() as u64, "Loading MODIS measurements".to_string());
        let mut report = BatchReport::default();
        for file in &files {
            let result = load_file(&store, file, &towns, predicate).await;
            report.record(file.display(), result, &pb);
        }
        pb.finish_with_message("MODIS measurements loaded");

        schema::create_town_index(store.pool(), Source::Modis).await?;

        report.into_result("MODIS files")
    })
    .await
}

async fn load_file(
    store: &Store,
    file: &Path,
    towns: &[Town],
    predicate: JoinPredicate,
) -> Result<Outcome> {
    let rows = tokio::task::block_in_place(|| town_rows(file, towns, predicate))?;

    let mut conn = store.pool().acquire().await?;
    let inserted = store_town_rows(&mut conn, Source::Modis, rows).await?;

    Ok(Outcome::Inserted(inserted))
}

/// Quality-masked NDVI town averages of one MODIS file.
pub fn town_rows(file: &Path, towns: &[Town], predicate: JoinPredicate) -> Result<Vec<TownRow>> {
    let mut raster = parquet::load_raster(file)?;
    if raster.times.len() != 1 {
        return Err(anyhow!(
            "{} holds {} dates, run `split-modis` first",
            file.display(),
            raster.times.len()
        ));
    }

    let masked = mask_unusable(&mut raster)?;
    debug!("{}: {} unusable pixels", file.display(), masked);

    let join = spatial_join(&raster.grid, MODIS_PIXEL_SIZE, towns, predicate);
    town_means(&raster, &join, towns, Source::Modis.columns())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use geo::{polygon, MultiPolygon};
    use tempfile::TempDir;

    use crate::raster::{band, midnight, Grid, Raster};

    use super::*;

    fn town() -> Town {
        let square = polygon![
            (x: -1.0, y: 41.0),
            (x: -0.99, y: 41.0),
            (x: -0.99, y: 41.01),
            (x: -1.0, y: 41.01),
            (x: -1.0, y: 41.0),
        ];
        Town::new("Zuera".to_string(), None, None, MultiPolygon(vec![square])).unwrap()
    }

    fn modis(dates: usize) -> Raster {
        let grid = Grid::new(vec![41.006, 41.004], vec![-0.996, -0.994]);
        let start = NaiveDate::from_ymd_opt(2021, 6, 10).unwrap();
        let times = (0..dates as u64)
            .map(|d| midnight(start + chrono::Days::new(d * 16)))
            .collect();
        let mut raster = Raster::new(grid, times);
        let ndvi = [Some(0.2), Some(0.9), Some(0.4), Some(0.6)];
        let quality = [Some(0.0), Some(3.0), Some(1.0), Some(f32::from(1u16 << 15))];
        raster
            .add_band(band::NDVI, ndvi.iter().copied().cycle().take(4 * dates).collect())
            .unwrap();
        raster
            .add_band(band::VI_QUALITY, quality.iter().copied().cycle().take(4 * dates).collect())
            .unwrap();
        raster
    }

    #[test]
    fn should_average_only_usable_pixels() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("modis_20210610.parquet");
        parquet::save_raster(&modis(1), &file).unwrap();

        let rows = town_rows(&file, &[town()], JoinPredicate::Intersects).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].town_name, "Zuera");
        // 0.9 is not produced, 0.6 is in shadow
        assert_eq!(rows[0].values, vec![Some(0.3)]);
    }

    #[test]
    fn should_reject_multi_date_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("modis_raw.parquet");
        parquet::save_raster(&modis(2), &file).unwrap();

        assert!(town_rows(&file, &[town()], JoinPredicate::default()).is_err());
    }
}
