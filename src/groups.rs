//! Group (tenant) commands.

use anyhow::{bail, Result};

use tiered_index_core::context::Tenant;
use tiered_index_core::models::GroupMeta;
use tiered_index_core::tenancy::{cascade_delete, group_closure, DeleteOutcome, DeleteScope};
use tiered_index_core::RecordId;

use crate::session::Session;
use crate::stats::print_group_counts;

pub async fn run_create(session: &Session, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Group name must not be empty");
    }
    let index = session.open().await?;
    let id = session
        .ingestor(&index, Tenant::Absent)
        .save_group(name)
        .await?;
    println!("Created group {}: {}", id, name);
    Ok(())
}

pub async fn run_list(session: &Session) -> Result<()> {
    let index = session.open().await?;
    let groups = index.list::<GroupMeta, _>(|_| true).await?;

    if groups.is_empty() {
        println!("No groups. Create one with `tix group create <name>`.");
        return Ok(());
    }

    println!("{:<3}{:<8} NAME", "", "ID");
    for g in groups {
        let marker = if session.ctx.group == Some(g.id) { "*" } else { "" };
        println!("{:<3}{:<8} {}", marker, g.id, g.meta.group_name);
    }
    Ok(())
}

/// Make `group` the active group; it must exist.
pub async fn run_use(session: &Session, group: RecordId) -> Result<()> {
    let index = session.open().await?;
    let Some(found) = index.fetch::<GroupMeta>(group).await? else {
        bail!("Group ID {} does not exist.", group);
    };
    session.state.set_group(group)?;
    println!("Active group: {} ({})", group, found.meta.group_name);
    Ok(())
}

pub fn run_clear(session: &Session) -> Result<()> {
    session.state.clear_group()?;
    println!("Active group cleared.");
    Ok(())
}

pub async fn run_stats(session: &Session, group: Option<RecordId>) -> Result<()> {
    let Some(group) = group.or(session.ctx.group) else {
        bail!("No group given and no active group set. Use `tix group use <id>`.");
    };
    let index = session.open().await?;
    let Some(found) = index.fetch::<GroupMeta>(group).await? else {
        println!("Group ID {} does not exist.", group);
        return Ok(());
    };
    let counts = group_closure(&index, group).await.counts();
    print_group_counts(group, &found.meta.group_name, &counts);
    Ok(())
}

pub async fn run_delete(
    session: &Session,
    group: RecordId,
    keep_graph: bool,
    keep_rollup: bool,
) -> Result<()> {
    let index = session.open().await?;
    let name = index
        .fetch::<GroupMeta>(group)
        .await?
        .map(|g| g.meta.group_name)
        .unwrap_or_default();
    let scope = DeleteScope {
        graph: !keep_graph,
        rollup: !keep_rollup,
    };

    match cascade_delete(&index, group, scope).await? {
        DeleteOutcome::GroupAbsent => {
            println!("Group ID {} does not exist.", group);
        }
        DeleteOutcome::Deleted(report) => {
            println!(
                "Group ID: {}, Delete graph: {}, Delete roll-up: {}",
                group, scope.graph, scope.rollup
            );
            println!("Before:");
            print_group_counts(group, &name, &report.before);
            println!("After:");
            print_group_counts(group, &name, &report.after);

            if scope.removes_raw() && session.ctx.group == Some(group) {
                session.state.clear_group()?;
                println!("Active group cleared.");
            }
        }
    }
    Ok(())
}
