//! Cross-tier query fusion.
//!
//! A query runs an independent similarity search against each tier its
//! [`QueryMode`] selects, enriches every hit with provenance (owning
//! group and papers), then merges the tiers into one ranked list.
//!
//! # Fusion Algorithm
//!
//! 1. Query each selected tier with the same `top_k` and tenant scope.
//! 2. Enrich: base chunks carry their own paper; summaries are flattened
//!    to base chunks; reports use their grounding chunk list. Chunks from
//!    a different group than the hit are excluded from its provenance.
//! 3. Concatenate in tier order: base, summary, report.
//! 4. Stable-sort ascending by distance, so exact ties keep tier order.
//! 5. Truncate to `top_k`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::Serialize;
use tracing::warn;

use crate::error::Degrade;
use crate::index::Index;
use crate::models::{
    ChunkMeta, CommunityReport, Metadata, RecordId, RecordKind, Summary,
};
use crate::store::{ScoredRecord, Store, TenantScope};
use crate::summary_tree::{flatten_to_base_chunks, SummaryForest};

/// Which tiers a query draws from. The discriminants are the CLI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryMode {
    /// Summary tree + community reports.
    GraphAndRollup = 1,
    /// Base chunks + summary tree.
    RollupWithBase = 2,
    /// Community reports only.
    Graph = 3,
    /// Base chunks only.
    BaseOnly = 4,
}

impl QueryMode {
    /// Tiers queried by this mode, in fusion order.
    pub fn tiers(self) -> &'static [SourceKind] {
        match self {
            QueryMode::GraphAndRollup => &[SourceKind::Summary, SourceKind::CommunityReport],
            QueryMode::RollupWithBase => &[SourceKind::Chunk, SourceKind::Summary],
            QueryMode::Graph => &[SourceKind::CommunityReport],
            QueryMode::BaseOnly => &[SourceKind::Chunk],
        }
    }
}

impl TryFrom<i64> for QueryMode {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(QueryMode::GraphAndRollup),
            2 => Ok(QueryMode::RollupWithBase),
            3 => Ok(QueryMode::Graph),
            4 => Ok(QueryMode::BaseOnly),
            other => bail!("Unknown query mode: {}. Use 1, 2, 3, or 4.", other),
        }
    }
}

impl FromStr for QueryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| anyhow!("Unknown query mode: {}. Use 1, 2, 3, or 4.", s))?;
        QueryMode::try_from(value)
    }
}

/// The collection a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Chunk,
    Summary,
    CommunityReport,
}

impl SourceKind {
    pub fn record_kind(self) -> RecordKind {
        match self {
            SourceKind::Chunk => RecordKind::Chunk,
            SourceKind::Summary => RecordKind::Summary,
            SourceKind::CommunityReport => RecordKind::CommunityReport,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_kind().collection_name())
    }
}

/// One fused query result.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub id: RecordId,
    pub text: String,
    pub distance: f64,
    pub group_id: Option<RecordId>,
    /// Owning papers, deduplicated and ordered by id.
    pub paper_ids: Vec<RecordId>,
    pub source: SourceKind,
    pub metadata: Metadata,
}

/// Bundles all inputs for a single query.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub text: &'a str,
    pub mode: QueryMode,
    pub top_k: usize,
    pub scope: TenantScope,
}

/// Chunk id → (paper, group), taken once per query.
#[derive(Debug, Default)]
pub struct ChunkDirectory {
    owners: HashMap<RecordId, (RecordId, RecordId)>,
}

impl ChunkDirectory {
    pub async fn snapshot<S: Store>(index: &Index<S>) -> crate::error::Result<Self> {
        let chunks = index.list::<ChunkMeta, _>(|_| true).await?;
        Ok(Self {
            owners: chunks
                .into_iter()
                .map(|c| (c.id, (c.meta.paper_id, c.meta.group_id)))
                .collect(),
        })
    }

    pub fn insert(&mut self, chunk: RecordId, paper: RecordId, group: RecordId) {
        self.owners.insert(chunk, (paper, group));
    }

    /// Papers owning `chunks`, restricted to chunks of `group`.
    ///
    /// Unknown chunk ids contribute nothing.
    pub fn papers_in_group<'c>(
        &self,
        chunks: impl IntoIterator<Item = &'c RecordId>,
        group: Option<RecordId>,
    ) -> Vec<RecordId> {
        let papers: BTreeSet<RecordId> = chunks
            .into_iter()
            .filter_map(|c| self.owners.get(c))
            .filter(|(_, g)| Some(*g) == group)
            .map(|(p, _)| *p)
            .collect();
        papers.into_iter().collect()
    }
}

/// Run a fused query against an [`Index`].
///
/// A tier whose similarity search fails contributes no hits; the other
/// tiers are still returned.
pub async fn query<S: Store>(index: &Index<S>, req: &QueryRequest<'_>) -> Vec<Hit> {
    if req.top_k == 0 || req.text.trim().is_empty() {
        return Vec::new();
    }

    let tiers = req.mode.tiers();
    let needs_provenance = tiers
        .iter()
        .any(|t| matches!(t, SourceKind::Summary | SourceKind::CommunityReport));
    let directory = if needs_provenance {
        ChunkDirectory::snapshot(index)
            .await
            .or_degraded("loading chunk provenance")
    } else {
        ChunkDirectory::default()
    };
    let forest = if tiers.contains(&SourceKind::Summary) {
        SummaryForest::snapshot(index)
            .await
            .or_degraded("loading summary tree")
    } else {
        SummaryForest::default()
    };

    let mut per_tier: Vec<Vec<Hit>> = Vec::with_capacity(tiers.len());
    for &tier in tiers {
        let scored = match index
            .similarity_query(tier.record_kind(), req.text, req.top_k, req.scope)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(%tier, error = %e, "tier query failed; skipping tier");
                Vec::new()
            }
        };
        let hits = scored
            .into_iter()
            .map(|s| match tier {
                SourceKind::Chunk => base_hit(s),
                SourceKind::Summary => summary_hit(s, &forest, &directory),
                SourceKind::CommunityReport => report_hit(s, &directory),
            })
            .collect();
        per_tier.push(hits);
    }

    fuse(per_tier, req.top_k)
}

/// Concatenate tiers in order, stable-sort by distance, keep `k`.
pub fn fuse(tiers: Vec<Vec<Hit>>, k: usize) -> Vec<Hit> {
    let mut all: Vec<Hit> = tiers.into_iter().flatten().collect();
    all.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    all.truncate(k);
    all
}

fn base_hit(scored: ScoredRecord) -> Hit {
    let record = scored.record;
    let paper_ids = record.meta_id("paper_id").into_iter().collect();
    Hit {
        id: record.id,
        group_id: record.group_id(),
        paper_ids,
        text: record.content,
        distance: scored.distance,
        source: SourceKind::Chunk,
        metadata: record.metadata,
    }
}

fn summary_hit(scored: ScoredRecord, forest: &SummaryForest, directory: &ChunkDirectory) -> Hit {
    let record = scored.record;
    let group_id = record.group_id();
    let paper_ids = match Summary::decode(&record) {
        Ok(summary) => {
            let base = flatten_to_base_chunks(&summary, forest);
            directory.papers_in_group(&base, group_id)
        }
        Err(e) => {
            warn!(id = %record.id, error = %e, "summary hit has invalid metadata");
            Vec::new()
        }
    };
    Hit {
        id: record.id,
        group_id,
        paper_ids,
        text: record.content,
        distance: scored.distance,
        source: SourceKind::Summary,
        metadata: record.metadata,
    }
}

fn report_hit(scored: ScoredRecord, directory: &ChunkDirectory) -> Hit {
    let record = scored.record;
    let group_id = record.group_id();
    let paper_ids = match CommunityReport::decode(&record) {
        Ok(report) => directory.papers_in_group(&report.meta.chunk_id_list, group_id),
        Err(e) => {
            warn!(id = %record.id, error = %e, "report hit has invalid metadata");
            Vec::new()
        }
    };
    Hit {
        id: record.id,
        group_id,
        paper_ids,
        text: record.content,
        distance: scored.distance,
        source: SourceKind::CommunityReport,
        metadata: record.metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::memory_index;
    use crate::models::{CommunityReportMeta, SummaryMeta};

    fn hit(id: u64, distance: f64, source: SourceKind) -> Hit {
        Hit {
            id: RecordId::new(id),
            text: String::new(),
            distance,
            group_id: None,
            paper_ids: Vec::new(),
            source,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("1".parse::<QueryMode>().unwrap(), QueryMode::GraphAndRollup);
        assert_eq!(QueryMode::try_from(4).unwrap(), QueryMode::BaseOnly);
        assert!(QueryMode::try_from(0).is_err());
        assert!("two".parse::<QueryMode>().is_err());
    }

    #[test]
    fn test_mode_tiers() {
        assert_eq!(
            QueryMode::RollupWithBase.tiers(),
            &[SourceKind::Chunk, SourceKind::Summary]
        );
        assert_eq!(QueryMode::Graph.tiers(), &[SourceKind::CommunityReport]);
    }

    #[test]
    fn test_fuse_tie_keeps_tier_order() {
        let fused = fuse(
            vec![
                vec![hit(1, 0.9, SourceKind::Chunk)],
                vec![hit(2, 0.3, SourceKind::Summary)],
                vec![hit(3, 0.3, SourceKind::CommunityReport)],
            ],
            2,
        );
        let sources: Vec<SourceKind> = fused.iter().map(|h| h.source).collect();
        assert_eq!(sources, vec![SourceKind::Summary, SourceKind::CommunityReport]);
    }

    #[test]
    fn test_fuse_truncates_and_sorts() {
        let fused = fuse(
            vec![
                vec![hit(1, 0.5, SourceKind::Chunk), hit(2, 0.1, SourceKind::Chunk)],
                vec![hit(3, 0.2, SourceKind::Summary)],
            ],
            10,
        );
        let ids: Vec<u64> = fused.iter().map(|h| h.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_papers_in_group_filters_cross_tenant_chunks() {
        let mut dir = ChunkDirectory::default();
        dir.insert(RecordId::new(1), RecordId::new(10), RecordId::new(1));
        dir.insert(RecordId::new(2), RecordId::new(10), RecordId::new(1));
        dir.insert(RecordId::new(3), RecordId::new(20), RecordId::new(2));
        let chunks = [RecordId::new(1), RecordId::new(2), RecordId::new(3), RecordId::new(4)];
        assert_eq!(
            dir.papers_in_group(&chunks, Some(RecordId::new(1))),
            vec![RecordId::new(10)]
        );
        assert!(dir.papers_in_group(&chunks, None).is_empty());
    }

    async fn seed_chunk(
        index: &Index<crate::store::memory::InMemoryStore>,
        text: &str,
        paper: u64,
        group: u64,
    ) -> RecordId {
        index
            .put_typed(
                text,
                &ChunkMeta {
                    paper_id: RecordId::new(paper),
                    group_id: RecordId::new(group),
                    denoising_chunk: String::new(),
                    sub_chunks: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_enriches_summary_and_report_provenance() {
        let index = memory_index();
        let c1 = seed_chunk(&index, "protein folding with attention", 1, 1).await;
        let c2 = seed_chunk(&index, "attention for protein structure", 2, 1).await;
        let foreign = seed_chunk(&index, "protein folding elsewhere", 9, 2).await;

        let leaf = index
            .put_typed(
                "leaf summary on protein folding",
                &SummaryMeta {
                    group_id: RecordId::new(1),
                    children: vec![c1, foreign],
                    from_base_chunk: true,
                    root_summary: false,
                },
            )
            .await
            .unwrap();
        index
            .put_typed(
                "root summary on protein folding attention",
                &SummaryMeta {
                    group_id: RecordId::new(1),
                    children: vec![leaf],
                    from_base_chunk: false,
                    root_summary: true,
                },
            )
            .await
            .unwrap();
        index
            .put_typed(
                "report on protein attention community",
                &CommunityReportMeta {
                    group_id: RecordId::new(1),
                    chunk_id_list: vec![c1, c2],
                },
            )
            .await
            .unwrap();

        let hits = query(
            &index,
            &QueryRequest {
                text: "protein folding attention",
                mode: QueryMode::GraphAndRollup,
                top_k: 10,
                scope: TenantScope::Group(RecordId::new(1)),
            },
        )
        .await;

        assert_eq!(hits.len(), 3);
        for h in &hits {
            assert_eq!(h.group_id, Some(RecordId::new(1)));
            match h.source {
                SourceKind::Summary => assert_eq!(h.paper_ids, vec![RecordId::new(1)]),
                SourceKind::CommunityReport => {
                    assert_eq!(h.paper_ids, vec![RecordId::new(1), RecordId::new(2)])
                }
                SourceKind::Chunk => panic!("mode 1 must not return base chunks"),
            }
        }
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn test_query_base_only_uses_chunk_provenance() {
        let index = memory_index();
        seed_chunk(&index, "lattice cryptography", 5, 3).await;
        let hits = query(
            &index,
            &QueryRequest {
                text: "lattice cryptography",
                mode: QueryMode::BaseOnly,
                top_k: 5,
                scope: TenantScope::All,
            },
        )
        .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_ids, vec![RecordId::new(5)]);
        assert_eq!(hits[0].group_id, Some(RecordId::new(3)));
        assert_eq!(hits[0].source, SourceKind::Chunk);
    }

    #[tokio::test]
    async fn test_query_empty_index_and_zero_k() {
        let index = memory_index();
        let req = QueryRequest {
            text: "anything",
            mode: QueryMode::RollupWithBase,
            top_k: 5,
            scope: TenantScope::All,
        };
        assert!(query(&index, &req).await.is_empty());
        seed_chunk(&index, "anything", 1, 1).await;
        let zero = QueryRequest { top_k: 0, ..req };
        assert!(query(&index, &zero).await.is_empty());
    }
}
