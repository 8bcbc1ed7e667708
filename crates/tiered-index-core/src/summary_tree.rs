//! Summary-tree flattening.
//!
//! A leaf summary (`from_base_chunk = true`) lists base chunk ids; an
//! internal summary lists other summary ids. [`flatten_to_base_chunks`]
//! walks any node down to the set of base chunks it ultimately
//! summarizes.
//!
//! Internal nodes gain children as later roll-up passes run, so the walk
//! always operates on a [`SummaryForest`] snapshot taken at call time.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::Result;
use crate::index::Index;
use crate::models::{RecordId, Summary, SummaryMeta};
use crate::store::Store;

/// Point-in-time view of every summary, keyed by id.
#[derive(Debug, Default)]
pub struct SummaryForest {
    nodes: HashMap<RecordId, Summary>,
}

impl SummaryForest {
    pub fn new(summaries: impl IntoIterator<Item = Summary>) -> Self {
        Self {
            nodes: summaries.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Read every summary currently stored.
    pub async fn snapshot<S: Store>(index: &Index<S>) -> Result<Self> {
        Ok(Self::new(index.list::<SummaryMeta, _>(|_| true).await?))
    }

    pub fn get(&self, id: RecordId) -> Option<&Summary> {
        self.nodes.get(&id)
    }
}

/// Resolve a summary to the deduplicated set of base chunk ids beneath it.
///
/// Children missing from the forest are skipped. A node reached twice
/// (shared subtree or malformed cycle) is expanded only once.
pub fn flatten_to_base_chunks(summary: &Summary, forest: &SummaryForest) -> BTreeSet<RecordId> {
    let mut out = BTreeSet::new();
    let mut visited = HashSet::new();
    walk(summary, forest, &mut visited, &mut out);
    out
}

fn walk(
    node: &Summary,
    forest: &SummaryForest,
    visited: &mut HashSet<RecordId>,
    out: &mut BTreeSet<RecordId>,
) {
    if !visited.insert(node.id) {
        return;
    }
    if node.meta.from_base_chunk {
        out.extend(node.meta.children.iter().copied());
        return;
    }
    for child_id in &node.meta.children {
        match forest.get(*child_id) {
            Some(child) => walk(child, forest, visited, out),
            None => debug!(summary = %node.id, child = %child_id, "skipping missing summary branch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::memory_index;

    fn node(id: u64, children: &[u64], from_base_chunk: bool) -> Summary {
        Summary {
            id: RecordId::new(id),
            content: format!("summary {}", id),
            meta: SummaryMeta {
                group_id: RecordId::new(1),
                children: children.iter().map(|c| RecordId::new(*c)).collect(),
                from_base_chunk,
                root_summary: false,
            },
        }
    }

    fn ids(set: &BTreeSet<RecordId>) -> Vec<u64> {
        set.iter().map(|id| id.get()).collect()
    }

    #[test]
    fn test_leaf_returns_children_directly() {
        let leaf = node(1, &[4, 2, 2], true);
        let forest = SummaryForest::new(vec![leaf.clone()]);
        assert_eq!(ids(&flatten_to_base_chunks(&leaf, &forest)), vec![2, 4]);
    }

    #[test]
    fn test_depth_three_tree_flattens_for_parent_and_root() {
        let leaf_a = node(1, &[1, 2], true);
        let leaf_b = node(2, &[3], true);
        let parent = node(3, &[2, 1], false);
        let root = node(4, &[3], false);
        let forest = SummaryForest::new(vec![
            leaf_a,
            leaf_b,
            parent.clone(),
            root.clone(),
        ]);
        assert_eq!(ids(&flatten_to_base_chunks(&parent, &forest)), vec![1, 2, 3]);
        assert_eq!(ids(&flatten_to_base_chunks(&root, &forest)), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_branch_is_skipped() {
        let leaf = node(1, &[7], true);
        let parent = node(2, &[1, 99], false);
        let forest = SummaryForest::new(vec![leaf, parent.clone()]);
        assert_eq!(ids(&flatten_to_base_chunks(&parent, &forest)), vec![7]);
    }

    #[test]
    fn test_cycle_terminates() {
        let a = node(1, &[2], false);
        let b = node(2, &[1, 3], false);
        let leaf = node(3, &[5], true);
        let forest = SummaryForest::new(vec![a.clone(), b, leaf]);
        assert_eq!(ids(&flatten_to_base_chunks(&a, &forest)), vec![5]);
    }

    #[tokio::test]
    async fn test_snapshot_sees_latest_children() {
        let index = memory_index();
        let leaf = index
            .put_typed(
                "leaf",
                &SummaryMeta {
                    group_id: RecordId::new(1),
                    children: vec![RecordId::new(10)],
                    from_base_chunk: true,
                    root_summary: false,
                },
            )
            .await
            .unwrap();
        let root_id = index
            .put_typed(
                "root",
                &SummaryMeta {
                    group_id: RecordId::new(1),
                    children: vec![leaf],
                    from_base_chunk: false,
                    root_summary: true,
                },
            )
            .await
            .unwrap();
        let forest = SummaryForest::snapshot(&index).await.unwrap();
        assert!(forest.get(leaf).is_some());
        let root = forest.get(root_id).unwrap();
        assert!(root.meta.root_summary);
        assert_eq!(ids(&flatten_to_base_chunks(root, &forest)), vec![10]);
    }
}
