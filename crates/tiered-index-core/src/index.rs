//! The record store façade.
//!
//! [`Index`] pairs a [`Store`] backend with an [`Embedder`] and exposes the
//! operations every other module is written against: `put`, `get_all`,
//! `similarity_query`, `delete`, and the generic typed accessor
//! [`Index::list`].
//!
//! All reads return [`Result`](crate::error::Result) so a store fault is
//! distinguishable from an empty collection.

use tracing::{debug, warn};

use crate::embedding::{embed_one, Embedder};
use crate::error::{IndexError, Result};
use crate::models::{encode_meta, Metadata, Record, RecordId, RecordKind, RecordMeta, Typed};
use crate::store::{ScoredRecord, Store, TenantScope};

pub struct Index<S> {
    store: S,
    embedder: Box<dyn Embedder>,
}

impl<S: Store> Index<S> {
    pub fn new(store: S, embedder: Box<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Append a record and return its id.
    ///
    /// The content is embedded first; if embedding fails the record is
    /// still stored, without a vector, and will not surface in similarity
    /// queries.
    pub async fn put(&self, kind: RecordKind, content: &str, metadata: &Metadata) -> Result<RecordId> {
        let vector = match embed_one(self.embedder.as_ref(), content).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(%kind, error = %e, "storing record without an embedding");
                None
            }
        };
        let id = self
            .store
            .insert(kind, content, metadata, vector.as_deref())
            .await
            .map_err(IndexError::Store)?;
        debug!(%kind, %id, "record stored");
        Ok(id)
    }

    /// Append a typed record.
    pub async fn put_typed<M: RecordMeta>(&self, content: &str, meta: &M) -> Result<RecordId> {
        let metadata = encode_meta(meta).map_err(|source| IndexError::Metadata {
            kind: M::KIND,
            source,
        })?;
        self.put(M::KIND, content, &metadata).await
    }

    pub async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>> {
        self.store.get(kind, id).await.map_err(IndexError::Store)
    }

    /// Every record of a collection, in no particular order.
    pub async fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>> {
        self.store.list(kind).await.map_err(IndexError::Store)
    }

    /// Typed records of `M::KIND` matching `predicate`, ordered by id.
    ///
    /// Records whose metadata does not decode are skipped: they are treated
    /// as absent cross-references rather than failing the whole listing.
    pub async fn list<M, P>(&self, predicate: P) -> Result<Vec<Typed<M>>>
    where
        M: RecordMeta,
        P: Fn(&Typed<M>) -> bool,
    {
        let kind = M::KIND;
        let mut out: Vec<Typed<M>> = self
            .get_all(kind)
            .await?
            .iter()
            .filter_map(|r| match Typed::<M>::decode(r) {
                Ok(t) => Some(t),
                Err(e) => {
                    debug!(%kind, id = %r.id, error = %e, "skipping undecodable record");
                    None
                }
            })
            .filter(|t| predicate(t))
            .collect();
        out.sort_by_key(|t| t.id);
        Ok(out)
    }

    /// Fetch one typed record; `None` if absent or undecodable.
    pub async fn fetch<M: RecordMeta>(&self, id: RecordId) -> Result<Option<Typed<M>>> {
        Ok(self
            .get(M::KIND, id)
            .await?
            .and_then(|r| Typed::<M>::decode(&r).ok()))
    }

    /// Up to `k` records nearest to `query_text`, ascending by distance.
    pub async fn similarity_query(
        &self,
        kind: RecordKind,
        query_text: &str,
        k: usize,
        scope: TenantScope,
    ) -> Result<Vec<ScoredRecord>> {
        if k == 0 || query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embed_one(self.embedder.as_ref(), query_text)
            .await
            .map_err(IndexError::Embedding)?;
        self.store
            .vector_search(kind, &query_vec, k, scope)
            .await
            .map_err(IndexError::Store)
    }

    /// Remove records by id; missing ids are ignored.
    pub async fn delete(&self, kind: RecordKind, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(kind, ids).await.map_err(IndexError::Store)?;
        debug!(%kind, requested = ids.len(), removed, "records deleted");
        Ok(removed)
    }

    pub async fn count(&self, kind: RecordKind) -> Result<usize> {
        self.store.count(kind).await.map_err(IndexError::Store)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::memory_index;
    use super::*;
    use crate::embedding::DisabledEmbedder;
    use crate::models::{GroupMeta, PaperMeta};
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_put_returns_one_through_n() {
        let index = memory_index();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(
                index
                    .put(RecordKind::Group, &format!("g{}", i), &Metadata::new())
                    .await
                    .unwrap()
                    .to_string(),
            );
        }
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_list_orders_by_numeric_id_and_filters() {
        let index = memory_index();
        for i in 1..=11u64 {
            let meta = PaperMeta {
                paper_name: format!("p{}.md", i),
                group_id: RecordId::new(i % 2),
                hash: String::new(),
            };
            index.put_typed(&format!("paper {}", i), &meta).await.unwrap();
        }
        let odd = index
            .list::<PaperMeta, _>(|p| p.meta.group_id == RecordId::new(1))
            .await
            .unwrap();
        let ids: Vec<u64> = odd.iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9, 11]);
    }

    #[tokio::test]
    async fn test_list_skips_undecodable_records() {
        let index = memory_index();
        index
            .put(RecordKind::Group, "broken", &Metadata::new())
            .await
            .unwrap();
        index
            .put_typed(
                "ok",
                &GroupMeta {
                    group_name: "ok".to_string(),
                },
            )
            .await
            .unwrap();
        let groups = index.list::<GroupMeta, _>(|_| true).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, RecordId::new(2));
    }

    #[tokio::test]
    async fn test_disabled_embedder_stores_but_cannot_query() {
        let index = Index::new(InMemoryStore::new(), Box::new(DisabledEmbedder));
        let id = index
            .put(RecordKind::Chunk, "plain text", &Metadata::new())
            .await
            .unwrap();
        assert_eq!(id, RecordId::new(1));
        let err = index
            .similarity_query(RecordKind::Chunk, "plain", 3, TenantScope::All)
            .await;
        assert!(matches!(err, Err(IndexError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_similarity_query_zero_k_is_empty() {
        let index = memory_index();
        index
            .put(RecordKind::Chunk, "text", &Metadata::new())
            .await
            .unwrap();
        let hits = index
            .similarity_query(RecordKind::Chunk, "text", 0, TenantScope::All)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
