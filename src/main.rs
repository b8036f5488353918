//! ERA5-Land and MODIS NDVI rasters to daily town-level time series.
//!
//! # Environment Variables
//! - `DATA_DIR`, `WORKERS`: file processing (see `config`)
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_POOL_MAX`:
//!   measurement store, only needed by the database subcommands
//! - `LOG_LEVEL` (optional): log verbosity when `RUST_LOG` is unset (default: `info`)
//! - `LOG_SPAN_EVENTS` (optional): span event mode for tracing
//! - `FORCE_COLOR` (optional): force coloured logs on or off
mod aggregate;
mod cli;
mod config;
mod db;
mod error;
mod modis;
mod parquet;
mod raster;
mod spatial;
mod sun;

use std::{env, io::IsTerminal, process};

use anyhow::Result;
use clap::Parser;
use cli::{command, Cli, Commands};
use dotenvy::dotenv;
use sun::{BoundingBox, SunTimesRequest};
use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(message) => println!("{}", message),
        Err(e) => {
            tracing::error!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let cfg = config::load_from_env()?;
    cfg.log_config();
    let db_config = || -> Result<config::DbConfig> {
        let db = config::load_db_from_env()?;
        db.log_config();
        Ok(db)
    };

    match cli.command {
        Commands::SunTimes {
            west,
            east,
            north,
            south,
            nrows,
            ncols,
            year,
        } => {
            let request = SunTimesRequest {
                bbox: BoundingBox {
                    west,
                    east,
                    north,
                    south,
                },
                nrows,
                ncols,
                year,
            };
            command::sun_times(&cfg, request).await
        }
        Commands::Daily {} => command::daily(&cfg).await,
        Commands::Anomaly { month } => command::anomaly(&cfg, month).await,
        Commands::Towns { file } => command::towns(&cfg, &db_config()?, file.as_deref()).await,
        Commands::Time { start, end } => command::time(&db_config()?, start, end).await,
        Commands::LoadEra5 { towns, predicate } => {
            command::load_era5(&cfg, &db_config()?, towns.as_deref(), predicate).await
        }
        Commands::SplitModis { file } => command::split_modis(&cfg, file.as_deref()).await,
        Commands::LoadModis { towns, predicate } => {
            command::load_modis(&cfg, &db_config()?, towns.as_deref(), predicate).await
        }
        Commands::Query {
            variable,
            date,
            output,
        } => command::query(&db_config()?, variable, date, output.as_deref()).await,
        Commands::Dates { variable } => command::dates(&db_config()?, variable).await,
    }
}

/// Installs the global tracing subscriber.
///
/// - `RUST_LOG` wins when set, otherwise `LOG_LEVEL` picks the level
/// - `LOG_SPAN_EVENTS`: `full`, `enter_exit`, or close events only (default)
/// - `FORCE_COLOR=1|true|yes` / `0|false|no`, otherwise TTY detection
///
/// Logs go to stderr so that stdout carries only command output.
fn init_tracing() {
    let span_events = match env::var("LOG_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
