//! Fuzzy identifier resolution.
//!
//! Derived text (a relationship description, a regenerated chunk) rarely
//! matches the record it came from byte for byte, and no stable key
//! survives the generation step. [`Resolver::resolve`] maps such text back
//! to a stored record with three fallbacks, first success wins:
//!
//! 1. **Exact**: whitespace-stripped containment, in either direction,
//!    against each candidate's content (or a named metadata field).
//! 2. **Similarity**: the single nearest neighbour from the vector index.
//! 3. **Line**: tier 1 repeated for each line of the query on its own.
//!
//! Candidates are restricted to the active tenant whenever they carry a
//! `group_id`, and are scanned in ascending id order.

use tracing::debug;

use crate::context::Tenant;
use crate::error::Degrade;
use crate::index::Index;
use crate::models::{Record, RecordId, RecordKind};
use crate::store::Store;

/// Which fallback produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Similarity,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { id: RecordId, tier: MatchTier },
    NotFound,
}

impl Resolution {
    pub fn id(&self) -> Option<RecordId> {
        match self {
            Resolution::Resolved { id, .. } => Some(*id),
            Resolution::NotFound => None,
        }
    }

    /// The resolved id, or the `"0"` sentinel.
    pub fn id_or_sentinel(&self) -> RecordId {
        self.id().unwrap_or(RecordId::NOT_FOUND)
    }
}

/// Strip every whitespace character.
pub fn normalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Containment in either direction; empty strings never match.
fn overlaps(query: &str, candidate: &str) -> bool {
    if query.is_empty() || candidate.is_empty() {
        return false;
    }
    candidate.contains(query) || query.contains(candidate)
}

struct Candidate {
    id: RecordId,
    normalized: String,
}

impl Candidate {
    fn from_record(record: &Record, field: Option<&str>) -> Self {
        let text = field
            .and_then(|f| record.meta_str(f))
            .filter(|v| !v.is_empty())
            .unwrap_or(&record.content);
        Candidate {
            id: record.id,
            normalized: normalize(text),
        }
    }
}

pub struct Resolver<'a, S> {
    index: &'a Index<S>,
    tenant: Tenant,
    max_distance: Option<f64>,
}

impl<'a, S: Store> Resolver<'a, S> {
    pub fn new(index: &'a Index<S>, tenant: Tenant) -> Self {
        Self {
            index,
            tenant,
            max_distance: None,
        }
    }

    /// Reject similarity hits farther than `max_distance`.
    pub fn with_max_distance(mut self, max_distance: Option<f64>) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Resolve `query` to a record of `kind`.
    ///
    /// When `field` names a metadata key, candidates are compared on that
    /// key's value if it is a non-empty string, else on their content.
    pub async fn resolve(&self, kind: RecordKind, query: &str, field: Option<&str>) -> Resolution {
        let mut records = self
            .index
            .get_all(kind)
            .await
            .or_degraded("listing resolver candidates");
        records.retain(|r| self.tenant.admits(r));
        records.sort_by_key(|r| r.id);
        let candidates: Vec<Candidate> = records
            .iter()
            .map(|r| Candidate::from_record(r, field))
            .collect();

        if let Some(id) = first_overlap(&candidates, query) {
            return resolved(kind, id, MatchTier::Exact);
        }

        if let Some(id) = self.nearest(kind, query).await {
            return resolved(kind, id, MatchTier::Similarity);
        }

        for line in query.split('\n') {
            if let Some(id) = first_overlap(&candidates, line) {
                return resolved(kind, id, MatchTier::Line);
            }
        }

        debug!(%kind, "identifier resolution exhausted all tiers");
        Resolution::NotFound
    }

    async fn nearest(&self, kind: RecordKind, query: &str) -> Option<RecordId> {
        let hits = self
            .index
            .similarity_query(kind, query, 1, self.tenant.scope())
            .await
            .or_degraded("similarity fallback");
        let hit = hits.into_iter().next()?;
        match self.max_distance {
            Some(max) if hit.distance > max => {
                debug!(%kind, distance = hit.distance, max, "nearest neighbour too far");
                None
            }
            _ => Some(hit.record.id),
        }
    }
}

fn first_overlap(candidates: &[Candidate], query: &str) -> Option<RecordId> {
    let needle = normalize(query);
    candidates
        .iter()
        .find(|c| overlaps(&needle, &c.normalized))
        .map(|c| c.id)
}

fn resolved(kind: RecordKind, id: RecordId, tier: MatchTier) -> Resolution {
    debug!(%kind, %id, ?tier, "identifier resolved");
    Resolution::Resolved { id, tier }
}
