use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use tiered_index_core::Index;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteStore;

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open the index at `db_path`, creating the schema if needed.
pub async fn open_index(config: &Config, db_path: &Path) -> Result<Index<SqliteStore>> {
    let pool = connect(db_path).await?;
    crate::migrate::apply(&pool).await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(Index::new(SqliteStore::new(pool), embedder))
}
