//! Explicit tenant context.
//!
//! The active storage location and active group are plain values passed
//! into every tenant-sensitive call. How they are persisted between CLI
//! invocations is the application's concern.

use std::path::PathBuf;

use crate::error::Degrade;
use crate::index::Index;
use crate::models::{GroupMeta, Record, RecordId, GROUP_ID_KEY};
use crate::store::{Store, TenantScope};

/// The caller's active storage location and tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveContext {
    /// Overrides the configured database path when set.
    pub db_path: Option<PathBuf>,
    /// Active group, if one has been selected.
    pub group: Option<RecordId>,
}

impl ActiveContext {
    pub fn with_group(group: RecordId) -> Self {
        Self {
            db_path: None,
            group: Some(group),
        }
    }
}

/// An active group that has been checked against the group collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenant {
    /// The group exists.
    Valid(RecordId),
    /// No group selected, or the selected group does not exist.
    Absent,
}

impl Tenant {
    /// Validate the context's group against the store.
    ///
    /// A store fault while checking degrades to [`Tenant::Absent`].
    pub async fn resolve<S: Store>(index: &Index<S>, ctx: &ActiveContext) -> Tenant {
        let Some(group) = ctx.group else {
            return Tenant::Absent;
        };
        let found = index
            .fetch::<GroupMeta>(group)
            .await
            .or_degraded("checking active group");
        match found {
            Some(_) => Tenant::Valid(group),
            None => Tenant::Absent,
        }
    }

    pub fn group(&self) -> Option<RecordId> {
        match self {
            Tenant::Valid(g) => Some(*g),
            Tenant::Absent => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Tenant::Valid(_))
    }

    /// Filter for similarity queries: the group when valid, else everything.
    pub fn scope(&self) -> TenantScope {
        match self {
            Tenant::Valid(g) => TenantScope::Group(*g),
            Tenant::Absent => TenantScope::All,
        }
    }

    /// Whether a record may be considered during an exhaustive scan.
    ///
    /// Records that carry a `group_id` are admitted only when it matches a
    /// valid tenant; records without one are always admitted.
    pub fn admits(&self, record: &Record) -> bool {
        match self {
            Tenant::Absent => true,
            Tenant::Valid(g) => {
                !record.metadata.contains_key(GROUP_ID_KEY) || record.group_id() == Some(*g)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::memory_index;
    use crate::models::{Metadata, RecordKind};

    #[tokio::test]
    async fn test_unknown_group_is_absent() {
        let index = memory_index();
        let tenant = Tenant::resolve(&index, &ActiveContext::with_group(RecordId::new(4))).await;
        assert_eq!(tenant, Tenant::Absent);
        assert_eq!(tenant.scope(), TenantScope::All);
    }

    #[tokio::test]
    async fn test_existing_group_is_valid() {
        let index = memory_index();
        let id = index
            .put_typed(
                "lab",
                &GroupMeta {
                    group_name: "lab".to_string(),
                },
            )
            .await
            .unwrap();
        let tenant = Tenant::resolve(&index, &ActiveContext::with_group(id)).await;
        assert_eq!(tenant, Tenant::Valid(id));
    }

    #[test]
    fn test_admits_records_without_group_key() {
        let record = Record {
            kind: RecordKind::Relationship,
            id: RecordId::new(1),
            content: String::new(),
            metadata: Metadata::new(),
        };
        assert!(Tenant::Valid(RecordId::new(2)).admits(&record));
    }

    #[test]
    fn test_rejects_other_tenant() {
        let mut metadata = Metadata::new();
        metadata.insert(GROUP_ID_KEY.into(), "3".into());
        let record = Record {
            kind: RecordKind::Chunk,
            id: RecordId::new(1),
            content: String::new(),
            metadata,
        };
        assert!(!Tenant::Valid(RecordId::new(2)).admits(&record));
        assert!(Tenant::Valid(RecordId::new(3)).admits(&record));
        assert!(Tenant::Absent.admits(&record));
    }
}
