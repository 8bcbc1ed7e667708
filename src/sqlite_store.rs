//! SQLite-backed [`Store`] implementation.
//!
//! Every record kind shares one `records` table keyed by `(kind, id)`.
//! Ids come from the `sequences` table, bumped in the same transaction as
//! the insert. The owning `group_id` is copied out of the metadata into
//! its own column so tenant filters run in SQL; vector search is a
//! brute-force cosine scan over the filtered rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tiered_index_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use tiered_index_core::models::{Metadata, Record, RecordId, RecordKind, GROUP_ID_KEY};
use tiered_index_core::store::{ScoredRecord, Store, TenantScope};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// The `group_id` metadata value in its decimal string form.
fn group_column(metadata: &Metadata) -> Option<String> {
    match metadata.get(GROUP_ID_KEY)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_to_record(kind: RecordKind, row: &SqliteRow) -> Result<Record> {
    let id: i64 = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata = serde_json::from_str(&metadata_json).with_context(|| {
        format!("corrupt metadata for {} record {}", kind.collection_name(), id)
    })?;
    Ok(Record {
        kind,
        id: RecordId::new(id as u64),
        content: row.get("content"),
        metadata,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(
        &self,
        kind: RecordKind,
        content: &str,
        metadata: &Metadata,
        vector: Option<&[f32]>,
    ) -> Result<RecordId> {
        let now = chrono::Utc::now().timestamp();
        let metadata_json = serde_json::to_string(metadata)?;
        let blob = vector.map(vec_to_blob);

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (kind, last_id) VALUES (?, 1)
            ON CONFLICT(kind) DO UPDATE SET last_id = last_id + 1
            RETURNING last_id
            "#,
        )
        .bind(kind.collection_name())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO records (kind, id, content, metadata_json, group_id, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind.collection_name())
        .bind(id)
        .bind(content)
        .bind(&metadata_json)
        .bind(group_column(metadata))
        .bind(blob)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RecordId::new(id as u64))
    }

    async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>> {
        let row = sqlx::query(
            "SELECT id, content, metadata_json FROM records WHERE kind = ? AND id = ?",
        )
        .bind(kind.collection_name())
        .bind(id.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_record(kind, &r)).transpose()
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let rows = sqlx::query("SELECT id, content, metadata_json FROM records WHERE kind = ?")
            .bind(kind.collection_name())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| row_to_record(kind, r)).collect()
    }

    async fn vector_search(
        &self,
        kind: RecordKind,
        query_vec: &[f32],
        limit: usize,
        scope: TenantScope,
    ) -> Result<Vec<ScoredRecord>> {
        let rows = match scope {
            TenantScope::All => {
                sqlx::query(
                    r#"
                    SELECT id, content, metadata_json, embedding FROM records
                    WHERE kind = ? AND embedding IS NOT NULL
                    "#,
                )
                .bind(kind.collection_name())
                .fetch_all(&self.pool)
                .await?
            }
            TenantScope::Group(group) => {
                sqlx::query(
                    r#"
                    SELECT id, content, metadata_json, embedding FROM records
                    WHERE kind = ? AND group_id = ? AND embedding IS NOT NULL
                    "#,
                )
                .bind(kind.collection_name())
                .bind(group.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Ok(ScoredRecord {
                    record: row_to_record(kind, row)?,
                    distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
                })
            })
            .collect::<Result<Vec<ScoredRecord>>>()?;

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.record.id.cmp(&b.record.id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn delete(&self, kind: RecordKind, ids: &[RecordId]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query("DELETE FROM records WHERE kind = ? AND id = ?")
                .bind(kind.collection_name())
                .bind(id.get() as i64)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn count(&self, kind: RecordKind) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE kind = ?")
            .bind(kind.collection_name())
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect(&tmp.path().join("t.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn grouped(group: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(GROUP_ID_KEY.into(), Value::String(group.into()));
        m
    }

    #[tokio::test]
    async fn test_ids_are_sequential_and_never_reused() {
        let (_tmp, store) = store().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                store
                    .insert(RecordKind::Chunk, &format!("c{}", i), &Metadata::new(), None)
                    .await
                    .unwrap()
                    .get(),
            );
        }
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(store.delete(RecordKind::Chunk, &[RecordId::new(3)]).await.unwrap(), 1);
        let next = store
            .insert(RecordKind::Chunk, "c3", &Metadata::new(), None)
            .await
            .unwrap();
        assert_eq!(next, RecordId::new(4));

        let other = store
            .insert(RecordKind::Paper, "p", &Metadata::new(), None)
            .await
            .unwrap();
        assert_eq!(other, RecordId::new(1));
    }

    #[tokio::test]
    async fn test_empty_collection_reads_as_empty() {
        let (_tmp, store) = store().await;
        assert!(store.list(RecordKind::Summary).await.unwrap().is_empty());
        assert_eq!(store.count(RecordKind::Summary).await.unwrap(), 0);
        assert!(store
            .get(RecordKind::Summary, RecordId::new(1))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .delete(RecordKind::Summary, &[RecordId::new(7)])
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_metadata_round_trips() {
        let (_tmp, store) = store().await;
        let mut meta = grouped("2");
        meta.insert("sub_chunks".into(), serde_json::json!(["a", "b"]));
        let id = store
            .insert(RecordKind::Chunk, "text", &meta, None)
            .await
            .unwrap();
        let record = store.get(RecordKind::Chunk, id).await.unwrap().unwrap();
        assert_eq!(record.metadata, meta);
        assert_eq!(record.group_id(), Some(RecordId::new(2)));
    }

    #[tokio::test]
    async fn test_vector_search_scopes_and_orders() {
        let (_tmp, store) = store().await;
        store
            .insert(RecordKind::Chunk, "far", &grouped("1"), Some(&[0.0, 1.0]))
            .await
            .unwrap();
        store
            .insert(RecordKind::Chunk, "near", &grouped("1"), Some(&[1.0, 0.1]))
            .await
            .unwrap();
        store
            .insert(RecordKind::Chunk, "other tenant", &grouped("2"), Some(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(RecordKind::Chunk, "no vector", &grouped("1"), None)
            .await
            .unwrap();

        let all = store
            .vector_search(RecordKind::Chunk, &[1.0, 0.0], 10, TenantScope::All)
            .await
            .unwrap();
        let contents: Vec<&str> = all.iter().map(|s| s.record.content.as_str()).collect();
        assert_eq!(contents, vec!["other tenant", "near", "far"]);

        let scoped = store
            .vector_search(
                RecordKind::Chunk,
                &[1.0, 0.0],
                1,
                TenantScope::Group(RecordId::new(1)),
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].record.content, "near");
    }

    #[tokio::test]
    async fn test_concurrent_inserts_get_distinct_ids() {
        let (_tmp, store) = store().await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(RecordKind::Chunk, &format!("c{}", i), &Metadata::new(), None)
                    .await
                    .unwrap()
                    .get()
            }));
        }
        let mut ids = std::collections::BTreeSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 32);
        assert!(!ids.contains(&0));
        assert_eq!(ids.iter().next_back(), Some(&32));
        assert_eq!(store.count(RecordKind::Chunk).await.unwrap(), 32);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let (_tmp, store) = store().await;
        sqlx::query(
            r#"
            INSERT INTO records (kind, id, content, metadata_json, embedding, created_at)
            VALUES ('chunk', 1, 'text', '{not json', ?, 0)
            "#,
        )
        .bind(vec_to_blob(&[1.0, 0.0]))
        .execute(store.pool())
        .await
        .unwrap();

        assert!(store.get(RecordKind::Chunk, RecordId::new(1)).await.is_err());
        assert!(store.list(RecordKind::Chunk).await.is_err());
        assert!(store
            .vector_search(RecordKind::Chunk, &[1.0, 0.0], 5, TenantScope::All)
            .await
            .is_err());
    }
}
