//! Graph and roll-up writes, plus identifier resolution.
//!
//! These commands are the hand-off point for external graph-extraction and
//! summarization passes: relationships and community reports are linked
//! back to stored chunks by text, summaries by explicit child ids.

use anyhow::{bail, Context, Result};
use std::path::Path;

use tiered_index_core::ingest::NewRelationship;
use tiered_index_core::models::{RecordKind, RelationshipMeta};
use tiered_index_core::resolve::Resolution;
use tiered_index_core::context::Tenant;
use tiered_index_core::{ActiveContext, RecordId};

use crate::session::Session;

pub async fn run_add_relationship(session: &Session, rel: &NewRelationship<'_>) -> Result<()> {
    let index = session.open().await?;
    let tenant = session.tenant(&index).await;
    let ingest = session.ingestor(&index, tenant);
    let id = ingest.save_relationship(rel).await?;

    let stored = index.fetch::<RelationshipMeta>(id).await?;
    match stored.map(|r| r.meta.chunk_id) {
        Some(chunk) if !chunk.is_not_found() => {
            println!("Added relationship {} (chunk {})", id, chunk)
        }
        _ => println!("Added relationship {} (chunk not found)", id),
    }
    Ok(())
}

pub async fn run_add_report(session: &Session, extraction: &Path, report: &Path) -> Result<()> {
    let extraction_text = std::fs::read_to_string(extraction)
        .with_context(|| format!("Failed to read {}", extraction.display()))?;
    let report_text = std::fs::read_to_string(report)
        .with_context(|| format!("Failed to read {}", report.display()))?;

    let index = session.open().await?;
    let tenant = session.tenant(&index).await;
    if !tenant.is_valid() {
        bail!("Community reports require a valid active group. Use `tix group use <id>`.");
    }
    let ingest = session.ingestor(&index, tenant);

    match ingest
        .save_community_report(&extraction_text, report_text.trim())
        .await?
    {
        Some(id) => println!("Added community report {}", id),
        None => println!("Community report not grounded in the active group; nothing stored."),
    }
    Ok(())
}

pub async fn run_add_summary(
    session: &Session,
    text: &str,
    children: &[RecordId],
    from_base: bool,
    root: bool,
    group: Option<RecordId>,
) -> Result<()> {
    let Some(group) = group.or(session.ctx.group) else {
        bail!("No group given and no active group set. Use `--group <id>` or `tix group use <id>`.");
    };
    if children.is_empty() {
        bail!("A summary needs at least one child id");
    }

    let index = session.open().await?;
    let tenant = Tenant::resolve(&index, &ActiveContext::with_group(group)).await;
    if !tenant.is_valid() {
        bail!("Group ID {} does not exist.", group);
    }
    let id = session
        .ingestor(&index, tenant)
        .save_summary(text, children.to_vec(), from_base, root, group)
        .await?;
    println!("Added summary {}", id);
    Ok(())
}

pub async fn run_resolve(
    session: &Session,
    kind: RecordKind,
    text: &str,
    field: Option<&str>,
) -> Result<()> {
    let index = session.open().await?;
    let tenant = session.tenant(&index).await;
    let resolution = session.resolver(&index, tenant).resolve(kind, text, field).await;
    match resolution {
        Resolution::Resolved { id, tier } => println!("{} ({:?})", id, tier),
        Resolution::NotFound => println!("{} (not found)", RecordId::NOT_FOUND),
    }
    Ok(())
}

/// Parse a comma-separated id list such as `1,2,5`.
pub fn parse_id_list(value: &str) -> Result<Vec<RecordId>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<RecordId>()
                .with_context(|| format!("Invalid id '{}'", s))
        })
        .collect()
}
