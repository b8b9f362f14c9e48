use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DbConfig;
use crate::error::{Error, Result};

/// Open the shared connection pool. All repository operations borrow
/// connections from it for the duration of one unit of work.
pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::StoreConnection(format!("create db directory: {e}")))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))
        .map_err(|e| Error::StoreConnection(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(config.pool_min)
        .max_connections(config.pool_max)
        .connect_with(options)
        .await
        .map_err(|e| Error::StoreConnection(e.to_string()))?;

    tracing::debug!(
        path = %config.path.display(),
        pool_min = config.pool_min,
        pool_max = config.pool_max,
        "connection pool created"
    );

    Ok(pool)
}
