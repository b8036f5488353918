//! Runtime configuration loaded from environment variables.
//!
//! `.env` support is provided by the caller (`dotenvy` in `main.rs`). Database
//! settings are loaded separately so that file-only subcommands run without
//! them.
use std::{env, path::PathBuf, thread};

use anyhow::{anyhow, Result};
use sqlx::postgres::PgConnectOptions;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_DATA_DIR: &str = "town-climate";

/// File-processing settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the raster and boundary files.
    pub data_dir: PathBuf,

    /// Size of the daily aggregation worker pool.
    pub workers: u32,
}

/// Connection settings for the measurement store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,

    /// Maximum pooled connections, also the loader worker count.
    pub pool_max: u32,
}

/// Optional:
/// - `DATA_DIR` (default: `~/town-climate`)
/// - `WORKERS` (default: available parallelism)
pub fn load_from_env() -> Result<Config> {
    // ---
    let data_dir = match env::var("DATA_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory, set DATA_DIR"))?
            .join(DEFAULT_DATA_DIR),
    };
    let default_workers = thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4);
    let workers = parse_env_u32!("WORKERS", default_workers).max(1);

    Ok(Config { data_dir, workers })
}

/// Required:
/// - `DB_USER`, `DB_PASSWORD`, `DB_NAME`
///
/// Optional:
/// - `DB_HOST` (default: `localhost`)
/// - `DB_PORT` (default: 5432)
/// - `DB_POOL_MAX` (default: 5)
pub fn load_db_from_env() -> Result<DbConfig> {
    // ---
    let user = require_env!("DB_USER");
    let password = require_env!("DB_PASSWORD");
    let name = require_env!("DB_NAME");
    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = parse_env_u32!("DB_PORT", 5432);
    let port = u16::try_from(port).map_err(|e| anyhow!("Invalid DB_PORT: {}", e))?;
    let pool_max = parse_env_u32!("DB_POOL_MAX", 5).max(1);

    Ok(DbConfig {
        host,
        port,
        user,
        password,
        name,
        pool_max,
    })
}

impl Config {
    pub fn log_config(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATA_DIR    : {}", self.data_dir.display());
        tracing::info!("  WORKERS     : {}", self.workers);
    }
}

impl DbConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }

    /// Connection target without the password.
    pub fn masked_url(&self) -> String {
        format!(
            "postgres://{}:****@{}:{}/{}",
            self.user, self.host, self.port, self.name
        )
    }

    /// Log the database settings, password masked.
    pub fn log_config(&self) {
        tracing::info!("  DATABASE    : {}", self.masked_url());
        tracing::info!("  DB_POOL_MAX : {}", self.pool_max);
    }
}

// -- Tests -------------------------------------------------------------------
