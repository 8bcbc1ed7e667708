//! Group closure and cascading deletion.
//!
//! A group's records are found by metadata joins recomputed on every call:
//!
//! | Collection | Belongs to the group when |
//! |---|---|
//! | paper | `group_id` matches |
//! | chunk | `paper_id` is a group paper, or its own `group_id` matches |
//! | relationship | `chunk_id` is a group chunk |
//! | community report | any grounding chunk is a group chunk |
//! | summary | `group_id` matches |
//!
//! Deletion removes derived layers selectively; raw ingested content
//! (group, papers, chunks) goes only when both derived layers go too.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::error::{Degrade, Result};
use crate::index::Index;
use crate::models::{
    ChunkMeta, CommunityReportMeta, GroupMeta, PaperMeta, RecordId, RecordKind, RelationshipMeta,
    SummaryMeta,
};
use crate::store::Store;

/// Every record id owned by one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupClosure {
    pub papers: BTreeSet<RecordId>,
    pub chunks: BTreeSet<RecordId>,
    pub relationships: BTreeSet<RecordId>,
    pub reports: BTreeSet<RecordId>,
    pub summaries: BTreeSet<RecordId>,
}

impl GroupClosure {
    pub fn counts(&self) -> ClosureCounts {
        ClosureCounts {
            papers: self.papers.len(),
            chunks: self.chunks.len(),
            relationships: self.relationships.len(),
            reports: self.reports.len(),
            summaries: self.summaries.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClosureCounts {
    pub papers: usize,
    pub chunks: usize,
    pub relationships: usize,
    pub reports: usize,
    pub summaries: usize,
}

/// Which derived layers a cascade removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteScope {
    /// Relationships and community reports.
    pub graph: bool,
    /// Summary tree.
    pub rollup: bool,
}

impl DeleteScope {
    pub const EVERYTHING: DeleteScope = DeleteScope {
        graph: true,
        rollup: true,
    };

    /// Raw content is removed only with every derived layer.
    pub fn removes_raw(&self) -> bool {
        self.graph && self.rollup
    }
}

impl Default for DeleteScope {
    fn default() -> Self {
        Self::EVERYTHING
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub before: ClosureCounts,
    pub after: ClosureCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    GroupAbsent,
    Deleted(DeleteReport),
}

/// Compute the closure of `group` for display.
///
/// A store fault degrades to an empty closure, and records with
/// undecodable metadata are skipped.
pub async fn group_closure<S: Store>(index: &Index<S>, group: RecordId) -> GroupClosure {
    try_group_closure(index, group)
        .await
        .or_degraded("computing group closure")
}

/// Compute the closure of `group`, failing on any store fault.
pub async fn try_group_closure<S: Store>(index: &Index<S>, group: RecordId) -> Result<GroupClosure> {
    let papers: BTreeSet<RecordId> = index
        .list::<PaperMeta, _>(|p| p.meta.group_id == group)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let chunks: BTreeSet<RecordId> = index
        .list::<ChunkMeta, _>(|c| papers.contains(&c.meta.paper_id) || c.meta.group_id == group)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();

    let relationships = index
        .list::<RelationshipMeta, _>(|r| chunks.contains(&r.meta.chunk_id))
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    let reports = index
        .list::<CommunityReportMeta, _>(|r| r.meta.chunk_id_list.iter().any(|c| chunks.contains(c)))
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    let summaries = index
        .list::<SummaryMeta, _>(|s| s.meta.group_id == group)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    Ok(GroupClosure {
        papers,
        chunks,
        relationships,
        reports,
        summaries,
    })
}

/// Delete a group's records according to `scope`.
///
/// Derived records go first (relationships, reports, summaries) so a
/// failure part-way never leaves them pointing at deleted chunks. The
/// closure is read in full before anything is removed; a store fault
/// aborts the cascade. An unknown group is reported as
/// [`DeleteOutcome::GroupAbsent`].
pub async fn cascade_delete<S: Store>(
    index: &Index<S>,
    group: RecordId,
    scope: DeleteScope,
) -> Result<DeleteOutcome> {
    let exists = index.fetch::<GroupMeta>(group).await?.is_some();
    if !exists {
        info!(%group, "group does not exist; nothing to delete");
        return Ok(DeleteOutcome::GroupAbsent);
    }

    let closure = try_group_closure(index, group).await?;
    let before = closure.counts();
    info!(%group, graph = scope.graph, rollup = scope.rollup, ?before, "deleting group records");

    if scope.graph {
        remove(index, RecordKind::Relationship, &closure.relationships).await?;
        remove(index, RecordKind::CommunityReport, &closure.reports).await?;
    }
    if scope.rollup {
        remove(index, RecordKind::Summary, &closure.summaries).await?;
    }
    if scope.removes_raw() {
        index.delete(RecordKind::Group, &[group]).await?;
        remove(index, RecordKind::Paper, &closure.papers).await?;
        remove(index, RecordKind::Chunk, &closure.chunks).await?;
    }

    let after = try_group_closure(index, group).await?.counts();
    Ok(DeleteOutcome::Deleted(DeleteReport { before, after }))
}

async fn remove<S: Store>(index: &Index<S>, kind: RecordKind, ids: &BTreeSet<RecordId>) -> Result<()> {
    let ids: Vec<RecordId> = ids.iter().copied().collect();
    let removed = index.delete(kind, &ids).await?;
    info!(%kind, removed, "cascade removed records");
    Ok(())
}
