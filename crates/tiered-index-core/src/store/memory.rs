//! In-memory [`Store`] implementation for testing and WASM targets.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Vector
//! search is brute-force cosine distance over every stored vector.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{Metadata, Record, RecordId, RecordKind};

use super::{ScoredRecord, Store, TenantScope};

struct StoredRecord {
    record: Record,
    vector: Option<Vec<f32>>,
}

#[derive(Default)]
struct Collection {
    last_id: u64,
    rows: BTreeMap<RecordId, StoredRecord>,
}

/// In-memory store for testing and WASM environments.
pub struct InMemoryStore {
    collections: RwLock<HashMap<RecordKind, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<RecordKind, Collection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<RecordKind, Collection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(
        &self,
        kind: RecordKind,
        content: &str,
        metadata: &Metadata,
        vector: Option<&[f32]>,
    ) -> Result<RecordId> {
        let mut collections = self.write()?;
        let collection = collections.entry(kind).or_default();
        collection.last_id += 1;
        let id = RecordId::new(collection.last_id);
        collection.rows.insert(
            id,
            StoredRecord {
                record: Record {
                    kind,
                    id,
                    content: content.to_string(),
                    metadata: metadata.clone(),
                },
                vector: vector.map(<[f32]>::to_vec),
            },
        );
        Ok(id)
    }

    async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>> {
        let collections = self.read()?;
        Ok(collections
            .get(&kind)
            .and_then(|c| c.rows.get(&id))
            .map(|s| s.record.clone()))
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let collections = self.read()?;
        Ok(collections
            .get(&kind)
            .map(|c| c.rows.values().map(|s| s.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn vector_search(
        &self,
        kind: RecordKind,
        query_vec: &[f32],
        limit: usize,
        scope: TenantScope,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.read()?;
        let Some(collection) = collections.get(&kind) else {
            return Ok(Vec::new());
        };
        let mut candidates: Vec<ScoredRecord> = collection
            .rows
            .values()
            .filter(|s| scope.admits(&s.record))
            .filter_map(|s| {
                s.vector.as_ref().map(|v| ScoredRecord {
                    record: s.record.clone(),
                    distance: cosine_distance(query_vec, v),
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn delete(&self, kind: RecordKind, ids: &[RecordId]) -> Result<usize> {
        let mut collections = self.write()?;
        let Some(collection) = collections.get_mut(&kind) else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter(|id| collection.rows.remove(id).is_some())
            .count())
    }

    async fn count(&self, kind: RecordKind) -> Result<usize> {
        let collections = self.read()?;
        Ok(collections.get(&kind).map(|c| c.rows.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Metadata {
        Metadata::new()
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_one() {
        let store = InMemoryStore::new();
        for expected in 1..=5u64 {
            let id = store
                .insert(RecordKind::Chunk, "text", &empty(), None)
                .await
                .unwrap();
            assert_eq!(id.to_string(), expected.to_string());
        }
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_deleting_newest() {
        let store = InMemoryStore::new();
        let a = store.insert(RecordKind::Paper, "a", &empty(), None).await.unwrap();
        let b = store.insert(RecordKind::Paper, "b", &empty(), None).await.unwrap();
        store.delete(RecordKind::Paper, &[b]).await.unwrap();
        let c = store.insert(RecordKind::Paper, "c", &empty(), None).await.unwrap();
        assert_eq!(a, RecordId::new(1));
        assert_eq!(c, RecordId::new(3));
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let store = InMemoryStore::new();
        store.insert(RecordKind::Group, "g", &empty(), None).await.unwrap();
        let id = store.insert(RecordKind::Paper, "p", &empty(), None).await.unwrap();
        assert_eq!(id, RecordId::new(1));
    }

    #[tokio::test]
    async fn test_missing_collection_reads_as_empty() {
        let store = InMemoryStore::new();
        assert!(store.list(RecordKind::Summary).await.unwrap().is_empty());
        assert_eq!(store.count(RecordKind::Summary).await.unwrap(), 0);
        assert_eq!(
            store.delete(RecordKind::Summary, &[RecordId::new(9)]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_vector_search_skips_unembedded_and_filters_scope() {
        let store = InMemoryStore::new();
        let mut g1 = empty();
        g1.insert("group_id".into(), "1".into());
        let mut g2 = empty();
        g2.insert("group_id".into(), "2".into());

        store
            .insert(RecordKind::Chunk, "no vector", &g1, None)
            .await
            .unwrap();
        let near = store
            .insert(RecordKind::Chunk, "near", &g1, Some(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(RecordKind::Chunk, "other tenant", &g2, Some(&[1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .vector_search(
                RecordKind::Chunk,
                &[1.0, 0.0],
                10,
                TenantScope::Group(RecordId::new(1)),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, near);
        assert!(hits[0].distance.abs() < 1e-6);
    }
}
