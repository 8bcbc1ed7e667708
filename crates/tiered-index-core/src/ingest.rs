//! Write-side operations for every record kind.
//!
//! [`Ingestor`] binds an [`Index`] to the caller's [`Tenant`] and is what
//! ingestion, graph extraction and roll-up passes write through. Derived
//! records (relationships, community reports) are linked back to their
//! source chunks with the [`Resolver`], since no stable key survives the
//! generation step.

use std::collections::BTreeSet;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::chunk::{split_into_sub_chunks, TokenCounter, WordTokenCounter, DEFAULT_MIN_SUB_CHUNK_TOKENS};
use crate::context::Tenant;
use crate::error::Result;
use crate::index::Index;
use crate::models::{
    ChunkMeta, CommunityReportMeta, GroupMeta, Paper, PaperMeta, RecordId, RecordKind,
    RelationshipMeta, SummaryMeta,
};
use crate::resolve::Resolver;
use crate::store::Store;
use crate::tenancy::try_group_closure;

const DESCRIPTION_OPEN: &str = "</target><description>";
const DESCRIPTION_CLOSE: &str = "</description>";

/// Metadata field chunks are matched on when linking a relationship.
pub const CHUNK_LINK_FIELD: &str = "denoising_chunk";
/// Metadata field relationships are matched on when grounding a report.
pub const RELATIONSHIP_LINK_FIELD: &str = "relationship_description";

/// SHA-256 hex digest of a paper's text.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Every `</target><description>…</description>` body in `text`, in order.
///
/// Bodies may span lines; each ends at the first closing tag after it.
pub fn extract_descriptions(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(DESCRIPTION_OPEN) {
        let body = &rest[start + DESCRIPTION_OPEN.len()..];
        let Some(end) = body.find(DESCRIPTION_CLOSE) else {
            break;
        };
        out.push(&body[..end]);
        rest = &body[end + DESCRIPTION_CLOSE.len()..];
    }
    out
}

/// How denoised chunk text is split into sub-chunks.
#[derive(Clone, Copy)]
pub struct SubChunking<'c> {
    pub min_tokens: usize,
    pub counter: &'c dyn TokenCounter,
}

impl Default for SubChunking<'static> {
    fn default() -> Self {
        Self {
            min_tokens: DEFAULT_MIN_SUB_CHUNK_TOKENS,
            counter: &WordTokenCounter,
        }
    }
}

/// A relationship produced by graph extraction.
#[derive(Debug, Clone)]
pub struct NewRelationship<'t> {
    /// Chunk text the relationship was extracted from.
    pub link_text: &'t str,
    pub source_entity_name: &'t str,
    pub target_entity_name: &'t str,
    pub description: &'t str,
    pub strength: f64,
}

pub struct Ingestor<'a, S> {
    index: &'a Index<S>,
    tenant: Tenant,
    max_distance: Option<f64>,
    sub_chunking: SubChunking<'a>,
}

impl<'a, S: Store> Ingestor<'a, S> {
    pub fn new(index: &'a Index<S>, tenant: Tenant) -> Self {
        Self {
            index,
            tenant,
            max_distance: None,
            sub_chunking: SubChunking::default(),
        }
    }

    /// Similarity cutoff forwarded to every resolver this ingestor builds.
    pub fn with_max_distance(mut self, max_distance: Option<f64>) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_sub_chunking(mut self, sub_chunking: SubChunking<'a>) -> Self {
        self.sub_chunking = sub_chunking;
        self
    }

    fn resolver(&self, tenant: Tenant) -> Resolver<'a, S> {
        Resolver::new(self.index, tenant).with_max_distance(self.max_distance)
    }

    pub async fn save_group(&self, name: &str) -> Result<RecordId> {
        let id = self
            .index
            .put_typed(
                name,
                &GroupMeta {
                    group_name: name.to_string(),
                },
            )
            .await?;
        info!(%id, name, "group created");
        Ok(id)
    }

    pub async fn save_paper(&self, content: &str, name: &str, group: RecordId) -> Result<RecordId> {
        let meta = PaperMeta {
            paper_name: name.to_string(),
            group_id: group,
            hash: content_hash(content),
        };
        let id = self.index.put_typed(content, &meta).await?;
        info!(%id, name, %group, "paper stored");
        Ok(id)
    }

    /// A paper of `group` with the given content hash, if one exists.
    pub async fn find_paper_by_hash(&self, hash: &str, group: RecordId) -> Result<Option<Paper>> {
        let mut found = self
            .index
            .list::<PaperMeta, _>(|p| p.meta.group_id == group && p.meta.hash == hash)
            .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Store one chunk; denoised text is also split into sub-chunks.
    pub async fn save_chunk(
        &self,
        text: &str,
        paper: RecordId,
        group: RecordId,
        denoised: Option<&str>,
    ) -> Result<RecordId> {
        let denoising_chunk = denoised.unwrap_or_default().to_string();
        let sub_chunks = if denoising_chunk.is_empty() {
            Vec::new()
        } else {
            split_into_sub_chunks(
                &denoising_chunk,
                self.sub_chunking.min_tokens,
                self.sub_chunking.counter,
            )
        };
        let meta = ChunkMeta {
            paper_id: paper,
            group_id: group,
            denoising_chunk,
            sub_chunks,
        };
        let id = self.index.put_typed(text, &meta).await?;
        debug!(%id, %paper, sub_chunks = meta.sub_chunks.len(), "chunk stored");
        Ok(id)
    }

    /// Store a relationship, linking it to the chunk its text came from.
    ///
    /// An unresolvable chunk is stored as [`RecordId::NOT_FOUND`].
    pub async fn save_relationship(&self, rel: &NewRelationship<'_>) -> Result<RecordId> {
        let chunk_id = self
            .resolver(self.tenant)
            .resolve(RecordKind::Chunk, rel.link_text, Some(CHUNK_LINK_FIELD))
            .await
            .id_or_sentinel();
        let meta = RelationshipMeta {
            source_entity_name: rel.source_entity_name.to_string(),
            target_entity_name: rel.target_entity_name.to_string(),
            relationship_description: rel.description.to_string(),
            relationship_strength: rel.strength,
            chunk_id,
        };
        let id = self.index.put_typed(rel.description, &meta).await?;
        info!(%id, %chunk_id, "relationship stored");
        Ok(id)
    }

    /// Store a community report grounded in the active group's chunks.
    ///
    /// Each embedded description is matched to a relationship, and that
    /// relationship's chunk is kept if the active group owns it. Returns
    /// `None` without writing when the tenant is absent, nothing is
    /// grounded, or `report_text` is empty.
    pub async fn save_community_report(
        &self,
        extraction_text: &str,
        report_text: &str,
    ) -> Result<Option<RecordId>> {
        let Some(group) = self.tenant.group() else {
            info!("no valid active group; community report dropped");
            return Ok(None);
        };
        let group_chunks = try_group_closure(self.index, group).await?.chunks;

        // Relationships carry no group_id, so the lookup is unscoped and
        // tenancy is enforced through the group's chunk set instead.
        let resolver = self.resolver(Tenant::Absent);
        let mut grounded = BTreeSet::new();
        for description in extract_descriptions(extraction_text) {
            let Some(rel_id) = resolver
                .resolve(RecordKind::Relationship, description, Some(RELATIONSHIP_LINK_FIELD))
                .await
                .id()
            else {
                continue;
            };
            if let Some(rel) = self.index.fetch::<RelationshipMeta>(rel_id).await? {
                if group_chunks.contains(&rel.meta.chunk_id) {
                    grounded.insert(rel.meta.chunk_id);
                }
            }
        }

        if grounded.is_empty() || report_text.is_empty() {
            info!(%group, grounded = grounded.len(), "community report not grounded; dropped");
            return Ok(None);
        }

        let meta = CommunityReportMeta {
            group_id: group,
            chunk_id_list: grounded.into_iter().collect(),
        };
        let id = self.index.put_typed(report_text, &meta).await?;
        info!(%id, %group, chunks = meta.chunk_id_list.len(), "community report stored");
        Ok(Some(id))
    }

    pub async fn save_summary(
        &self,
        text: &str,
        children: Vec<RecordId>,
        from_base_chunk: bool,
        root_summary: bool,
        group: RecordId,
    ) -> Result<RecordId> {
        let meta = SummaryMeta {
            group_id: group,
            children,
            from_base_chunk,
            root_summary,
        };
        let id = self.index.put_typed(text, &meta).await?;
        info!(%id, %group, root_summary, "summary stored");
        Ok(id)
    }

    /// Texts handed to graph extraction for the paper matching `paper_text`.
    ///
    /// Each chunk contributes its sub-chunks when it has any, else its own
    /// text. An unresolvable paper yields nothing.
    pub async fn chunks_for_extraction(&self, paper_text: &str) -> Result<Vec<String>> {
        let Some(paper) = self
            .resolver(self.tenant)
            .resolve(RecordKind::Paper, paper_text, None)
            .await
            .id()
        else {
            return Ok(Vec::new());
        };
        let chunks = self
            .index
            .list::<ChunkMeta, _>(|c| c.meta.paper_id == paper)
            .await?;
        Ok(chunks
            .into_iter()
            .flat_map(|c| {
                if c.meta.sub_chunks.is_empty() {
                    vec![c.content]
                } else {
                    c.meta.sub_chunks
                }
            })
            .collect())
    }

    pub async fn group_name(&self, group: RecordId) -> Result<Option<String>> {
        Ok(self
            .index
            .fetch::<GroupMeta>(group)
            .await?
            .map(|g| g.meta.group_name))
    }

    /// Paper name, with its final extension removed unless `with_suffix`.
    pub async fn paper_name(&self, paper: RecordId, with_suffix: bool) -> Result<Option<String>> {
        Ok(self.index.fetch::<PaperMeta>(paper).await?.map(|p| {
            if with_suffix {
                p.meta.paper_name
            } else {
                Path::new(&p.meta.paper_name)
                    .with_extension("")
                    .to_string_lossy()
                    .into_owned()
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbedder;
    use crate::index::test_support::memory_index;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_extract_descriptions_spans_lines() {
        let text = "<source>A</source><target>B</target><description>first\nline</description>\n\
                    <target>C</target> <description>ignored</description>\
                    </target><description>second</description>";
        assert_eq!(extract_descriptions(text), vec!["first\nline", "second"]);
        assert!(extract_descriptions("</target><description>unterminated").is_empty());
    }

    async fn group_with_chunk(ingest: &Ingestor<'_, InMemoryStore>, name: &str, text: &str, denoised: &str) -> (RecordId, RecordId) {
        let group = ingest.save_group(name).await.unwrap();
        let paper = ingest.save_paper(text, "paper.pdf", group).await.unwrap();
        let chunk = ingest
            .save_chunk(text, paper, group, Some(denoised))
            .await
            .unwrap();
        (group, chunk)
    }

    #[tokio::test]
    async fn test_find_paper_by_hash() {
        let index = memory_index();
        let ingest = Ingestor::new(&index, Tenant::Absent);
        let group = ingest.save_group("lab").await.unwrap();
        let paper = ingest.save_paper("body", "a.md", group).await.unwrap();
        let found = ingest
            .find_paper_by_hash(&content_hash("body"), group)
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(paper));
        let other = ingest
            .find_paper_by_hash(&content_hash("body"), RecordId::new(99))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_save_chunk_splits_denoised_text() {
        let index = memory_index();
        let ingest = Ingestor::new(&index, Tenant::Absent);
        let id = ingest
            .save_chunk("raw", RecordId::new(1), RecordId::new(1), Some("#one #two"))
            .await
            .unwrap();
        let chunk = index.fetch::<ChunkMeta>(id).await.unwrap().unwrap();
        assert_eq!(chunk.meta.denoising_chunk, "#one #two");
        assert_eq!(chunk.meta.sub_chunks, vec!["#one #two".to_string()]);

        let plain = ingest
            .save_chunk("raw", RecordId::new(1), RecordId::new(1), None)
            .await
            .unwrap();
        let plain = index.fetch::<ChunkMeta>(plain).await.unwrap().unwrap();
        assert!(plain.meta.denoising_chunk.is_empty());
        assert!(plain.meta.sub_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_relationship_links_chunk_by_denoised_text() {
        let index = memory_index();
        let setup = Ingestor::new(&index, Tenant::Absent);
        let (group, chunk) =
            group_with_chunk(&setup, "lab", "r@w t3xt", "Clean sentence about enzymes.").await;
        let ingest = Ingestor::new(&index, Tenant::Valid(group));
        let rel = ingest
            .save_relationship(&NewRelationship {
                link_text: "Clean sentence about enzymes.",
                source_entity_name: "ENZYME",
                target_entity_name: "SUBSTRATE",
                description: "enzyme binds substrate",
                strength: 7.0,
            })
            .await
            .unwrap();
        let stored = index.fetch::<RelationshipMeta>(rel).await.unwrap().unwrap();
        assert_eq!(stored.meta.chunk_id, chunk);
        assert_eq!(stored.content, "enzyme binds substrate");
    }

    #[tokio::test]
    async fn test_unresolved_relationship_stores_sentinel() {
        let index = Index::new(InMemoryStore::new(), Box::new(DisabledEmbedder));
        let ingest = Ingestor::new(&index, Tenant::Absent);
        let rel = ingest
            .save_relationship(&NewRelationship {
                link_text: "no chunks exist",
                source_entity_name: "A",
                target_entity_name: "B",
                description: "a to b",
                strength: 1.0,
            })
            .await
            .unwrap();
        let stored = index.fetch::<RelationshipMeta>(rel).await.unwrap().unwrap();
        assert!(stored.meta.chunk_id.is_not_found());
    }

    #[tokio::test]
    async fn test_report_grounded_in_active_group() {
        let index = memory_index();
        let setup = Ingestor::new(&index, Tenant::Absent);
        let (group, chunk) = group_with_chunk(&setup, "lab", "chunk one", "denoised one").await;
        let (_, foreign_chunk) = group_with_chunk(&setup, "other", "chunk two", "denoised two").await;

        let ingest = Ingestor::new(&index, Tenant::Valid(group));
        for (link, desc) in [
            ("denoised one", "alpha regulates beta"),
            ("denoised one", "beta inhibits gamma"),
        ] {
            ingest
                .save_relationship(&NewRelationship {
                    link_text: link,
                    source_entity_name: "S",
                    target_entity_name: "T",
                    description: desc,
                    strength: 5.0,
                })
                .await
                .unwrap();
        }
        let foreign = Ingestor::new(&index, Tenant::Absent);
        foreign
            .save_relationship(&NewRelationship {
                link_text: "denoised two",
                source_entity_name: "S",
                target_entity_name: "T",
                description: "delta binds epsilon",
                strength: 5.0,
            })
            .await
            .unwrap();

        let extraction = "</target><description>alpha regulates beta</description>\
                          </target><description>beta inhibits gamma</description>\
                          </target><description>delta binds epsilon</description>";
        let id = ingest
            .save_community_report(extraction, "A community about regulation.")
            .await
            .unwrap()
            .unwrap();
        let report = index.fetch::<CommunityReportMeta>(id).await.unwrap().unwrap();
        assert_eq!(report.meta.chunk_id_list, vec![chunk]);
        assert!(!report.meta.chunk_id_list.contains(&foreign_chunk));
        assert_eq!(report.meta.group_id, group);
    }

    #[tokio::test]
    async fn test_report_dropped_when_ungrounded_or_tenant_absent() {
        let index = memory_index();
        let setup = Ingestor::new(&index, Tenant::Absent);
        let (group, _) = group_with_chunk(&setup, "lab", "chunk", "denoised").await;
        let extraction = "</target><description>unknown link</description>";

        let absent = setup
            .save_community_report(extraction, "report")
            .await
            .unwrap();
        assert!(absent.is_none());

        let scoped = Ingestor::new(&index, Tenant::Valid(group));
        let ungrounded = scoped
            .save_community_report("no markers here", "report")
            .await
            .unwrap();
        assert!(ungrounded.is_none());
        assert_eq!(index.count(RecordKind::CommunityReport).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunks_for_extraction_prefers_sub_chunks() {
        let index = memory_index();
        let ingest = Ingestor::new(&index, Tenant::Absent);
        let group = ingest.save_group("lab").await.unwrap();
        let paper = ingest
            .save_paper("full paper text", "p.md", group)
            .await
            .unwrap();
        ingest
            .save_chunk("first chunk", paper, group, Some("#a #b"))
            .await
            .unwrap();
        ingest
            .save_chunk("second chunk", paper, group, None)
            .await
            .unwrap();
        let texts = ingest.chunks_for_extraction("full paper text").await.unwrap();
        assert_eq!(texts, vec!["#a #b".to_string(), "second chunk".to_string()]);
    }

    #[tokio::test]
    async fn test_name_lookups() {
        let index = memory_index();
        let ingest = Ingestor::new(&index, Tenant::Absent);
        let group = ingest.save_group("lab").await.unwrap();
        let paper = ingest
            .save_paper("text", "attention.v2.pdf", group)
            .await
            .unwrap();
        assert_eq!(ingest.group_name(group).await.unwrap().as_deref(), Some("lab"));
        assert_eq!(
            ingest.paper_name(paper, false).await.unwrap().as_deref(),
            Some("attention.v2")
        );
        assert_eq!(
            ingest.paper_name(paper, true).await.unwrap().as_deref(),
            Some("attention.v2.pdf")
        );
        assert!(ingest.group_name(RecordId::new(9)).await.unwrap().is_none());
    }
}
