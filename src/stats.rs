//! Index statistics.
//!
//! `tix stats` prints record and embedding counts per collection;
//! `tix group stats` prints one group's closure.

use anyhow::Result;
use sqlx::Row;

use tiered_index_core::models::RecordKind;
use tiered_index_core::tenancy::ClosureCounts;
use tiered_index_core::RecordId;

use crate::session::Session;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(session: &Session) -> Result<()> {
    let db_path = session.db_path();
    let index = session.open().await?;
    let pool = index.store().pool();

    let rows = sqlx::query(
        r#"
        SELECT kind, COUNT(*) AS total, COUNT(embedding) AS embedded
        FROM records
        GROUP BY kind
        "#,
    )
    .fetch_all(pool)
    .await?;

    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Tiered Index Database Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embedder:    {}", index.embedder().model_name());
    match session.ctx.group {
        Some(g) => println!("  Group:       {}", g),
        None => println!("  Group:       (none)"),
    }
    println!();
    println!("  {:<20} {:>8} {:>10}", "COLLECTION", "RECORDS", "EMBEDDED");
    println!("  {}", "-".repeat(40));

    for kind in RecordKind::ALL {
        let row = rows.iter().find(|r| {
            let k: String = r.get("kind");
            k == kind.collection_name()
        });
        let (total, embedded): (i64, i64) = match row {
            Some(r) => (r.get("total"), r.get("embedded")),
            None => (0, 0),
        };
        println!(
            "  {:<20} {:>8} {:>10}",
            kind.collection_name(),
            total,
            embedded
        );
    }
    println!();

    Ok(())
}

/// Print a group's closure counts, split into raw, graph, and roll-up layers.
pub fn print_group_counts(group: RecordId, name: &str, counts: &ClosureCounts) {
    println!("Group ID: {}, Group Name: {}", group, name);
    println!("  Papers:             {}", counts.papers);
    println!("  Chunks:             {}", counts.chunks);
    println!("  Graph:");
    println!("    Relationships:    {}", counts.relationships);
    println!("    Community reports: {}", counts.reports);
    println!("  Roll-up:");
    println!("    Summaries:        {}", counts.summaries);
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
