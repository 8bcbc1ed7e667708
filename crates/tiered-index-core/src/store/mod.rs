//! Storage abstraction for the index.
//!
//! The [`Store`] trait defines the keyed, similarity-searchable
//! collections the rest of the crate is written against, enabling
//! pluggable backends (SQLite in the application crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Identifier assignment
//!
//! [`Store::insert`] assigns the id. Ids are decimal, start at 1, and come
//! from a per-collection high-water mark that is advanced atomically with
//! the insert, so concurrent writers never collide and deleting the
//! newest record never causes its id to be handed out again.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Metadata, Record, RecordId, RecordKind};

/// Tenant restriction applied to similarity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantScope {
    /// No filter: search every group.
    #[default]
    All,
    /// Only records whose `group_id` metadata equals this group.
    Group(RecordId),
}

impl TenantScope {
    /// Map the CLI convention (`-1` = all groups) onto a scope.
    pub fn from_cli(value: i64) -> Self {
        if value < 0 {
            TenantScope::All
        } else {
            TenantScope::Group(RecordId::new(value as u64))
        }
    }

    /// Whether a record passes this filter.
    ///
    /// Under a group scope, records without a `group_id` never match.
    pub fn admits(&self, record: &Record) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Group(g) => record.group_id() == Some(*g),
        }
    }
}

/// A record returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: Record,
    /// Cosine distance to the query; smaller is more similar.
    pub distance: f64,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](Store::insert) | Append a record, assigning the next id |
/// | [`get`](Store::get) | Fetch one record by id |
/// | [`list`](Store::list) | Every record of a collection, unordered |
/// | [`vector_search`](Store::vector_search) | Nearest records by cosine distance |
/// | [`delete`](Store::delete) | Remove records by id; missing ids are ignored |
/// | [`count`](Store::count) | Number of records in a collection |
///
/// A collection that has never been written to behaves as empty.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a record and return its newly assigned id.
    async fn insert(
        &self,
        kind: RecordKind,
        content: &str,
        metadata: &Metadata,
        vector: Option<&[f32]>,
    ) -> Result<RecordId>;

    async fn get(&self, kind: RecordKind, id: RecordId) -> Result<Option<Record>>;

    async fn list(&self, kind: RecordKind) -> Result<Vec<Record>>;

    /// Up to `limit` records ordered by ascending distance. Records
    /// stored without a vector are not candidates.
    async fn vector_search(
        &self,
        kind: RecordKind,
        query_vec: &[f32],
        limit: usize,
        scope: TenantScope,
    ) -> Result<Vec<ScoredRecord>>;

    /// Remove records by id, returning how many existed.
    async fn delete(&self, kind: RecordKind, ids: &[RecordId]) -> Result<usize>;

    async fn count(&self, kind: RecordKind) -> Result<usize>;
}
