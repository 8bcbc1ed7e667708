//! `tix query`: fused retrieval across tiers.

use anyhow::{bail, Result};

use tiered_index_core::search::{query, Hit, QueryMode, QueryRequest};
use tiered_index_core::TenantScope;

use crate::session::Session;

/// Characters of hit text shown per result.
const SNIPPET_CHARS: usize = 240;

pub async fn run_query(
    session: &Session,
    mode: QueryMode,
    text: &str,
    top_k: Option<i64>,
    group: Option<i64>,
    json: bool,
) -> Result<()> {
    let top_k = top_k.unwrap_or(session.config.retrieval.top_k);
    if top_k < 1 {
        bail!("--top-k must be >= 1");
    }

    let index = session.open().await?;
    let scope = match group {
        Some(g) => TenantScope::from_cli(g),
        None => session.tenant(&index).await.scope(),
    };

    let hits = query(
        &index,
        &QueryRequest {
            text,
            mode,
            top_k: top_k as usize,
            scope,
        },
    )
    .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &Hit) {
    let group = hit
        .group_id
        .map(|g| g.to_string())
        .unwrap_or_else(|| "-".to_string());
    let papers: Vec<String> = hit.paper_ids.iter().map(|p| p.to_string()).collect();
    println!(
        "{}. [{}:{}] distance={:.4} group={} papers=[{}]",
        rank,
        hit.source,
        hit.id,
        hit.distance,
        group,
        papers.join(",")
    );
    println!("   {}", snippet(&hit.text));
    println!();
}

fn snippet(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut)
    }
}
