use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

use crate::db;

pub async fn run_migrations(db_path: &Path) -> Result<()> {
    let pool = db::connect(db_path).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index; safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per record of every kind
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            kind TEXT NOT NULL,
            id INTEGER NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            group_id TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (kind, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-kind high-water mark for id assignment
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sequences (
            kind TEXT PRIMARY KEY,
            last_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_kind_group ON records(kind, group_id)")
        .execute(pool)
        .await?;

    Ok(())
}
