//! Paper ingestion: read files, split them into chunks, store both.
//!
//! `tix paper add` accepts a single file or a directory. Directories are
//! walked with the `[ingest]` include/exclude globs. A paper whose content
//! hash already exists in the target group is skipped.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use tiered_index_core::chunk::split_into_chunks;
use tiered_index_core::context::Tenant;
use tiered_index_core::ingest::{content_hash, Ingestor};
use tiered_index_core::models::PaperMeta;
use tiered_index_core::{ActiveContext, RecordId};

use crate::config::IngestConfig;
use crate::session::Session;
use crate::sqlite_store::SqliteStore;

/// Line separating per-chunk sections of a denoised file.
const DENOISED_SEPARATOR: &str = "---";

pub async fn run_add(
    session: &Session,
    path: &Path,
    group: Option<RecordId>,
    denoised: Option<&Path>,
) -> Result<()> {
    let Some(group) = group.or(session.ctx.group) else {
        bail!("No group given and no active group set. Use `--group <id>` or `tix group use <id>`.");
    };

    let index = session.open().await?;
    let tenant = Tenant::resolve(&index, &ActiveContext::with_group(group)).await;
    if !tenant.is_valid() {
        bail!("Group ID {} does not exist.", group);
    }
    let ingest = session.ingestor(&index, tenant);

    let files = collect_files(path, &session.config.ingest)?;
    if files.is_empty() {
        println!("No matching files under {}", path.display());
        return Ok(());
    }
    if denoised.is_some() && files.len() > 1 {
        bail!("--denoised can only be used when adding a single file");
    }
    let denoised_sections = match denoised {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read denoised file: {}", p.display()))?;
            split_denoised_sections(&text)
        }
        None => Vec::new(),
    };

    let mut added = 0usize;
    let mut skipped = 0usize;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        match add_paper(
            &ingest,
            file,
            &content,
            group,
            &denoised_sections,
            session.config.chunking.min_chunk_chars,
        )
        .await?
        {
            Some((paper, chunks)) => {
                println!("Added paper {} ({} chunks): {}", paper, chunks, file.display());
                added += 1;
            }
            None => skipped += 1,
        }
    }

    println!("Done: {} added, {} skipped (group {})", added, skipped, group);
    Ok(())
}

/// Store one paper and its chunks; `None` when it was already ingested.
async fn add_paper(
    ingest: &Ingestor<'_, SqliteStore>,
    file: &Path,
    content: &str,
    group: RecordId,
    denoised_sections: &[String],
    min_chunk_chars: usize,
) -> Result<Option<(RecordId, usize)>> {
    if let Some(existing) = ingest
        .find_paper_by_hash(&content_hash(content), group)
        .await?
    {
        println!(
            "Skipping {}: already ingested as paper {}",
            file.display(),
            existing.id
        );
        return Ok(None);
    }

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    let paper = ingest.save_paper(content, &name, group).await?;

    let chunks = split_into_chunks(content, min_chunk_chars);
    for (i, chunk) in chunks.iter().enumerate() {
        let denoised = denoised_sections
            .get(i)
            .map(String::as_str)
            .filter(|s| !s.is_empty());
        ingest.save_chunk(chunk, paper, group, denoised).await?;
    }
    info!(%paper, chunks = chunks.len(), "paper ingested");

    Ok(Some((paper, chunks.len())))
}

/// Split a denoised file into per-chunk sections on `---` lines.
pub fn split_denoised_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim() == DENOISED_SEPARATOR {
            sections.push(current.join("\n").trim().to_string());
            current.clear();
        } else {
            current.push(line);
        }
    }
    sections.push(current.join("\n").trim().to_string());
    sections
}

/// Print the texts graph extraction should read for the paper in `path`,
/// one `---`-separated section each.
pub async fn run_extract(session: &Session, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let index = session.open().await?;
    let tenant = session.tenant(&index).await;
    let texts = session
        .ingestor(&index, tenant)
        .chunks_for_extraction(&content)
        .await?;

    if texts.is_empty() {
        println!("No stored paper matches {}", path.display());
        return Ok(());
    }
    println!("{}", texts.join(&format!("\n{}\n", DENOISED_SEPARATOR)));
    Ok(())
}

pub async fn run_show(session: &Session, paper: RecordId, with_suffix: bool) -> Result<()> {
    let index = session.open().await?;
    let ingest = session.ingestor(&index, Tenant::Absent);
    let Some(name) = ingest.paper_name(paper, with_suffix).await? else {
        bail!("Paper ID {} does not exist.", paper);
    };
    let group = index
        .fetch::<PaperMeta>(paper)
        .await?
        .map(|p| p.meta.group_id)
        .unwrap_or_default();
    let group_name = ingest.group_name(group).await?.unwrap_or_else(|| "-".to_string());
    println!("Paper ID: {}, Paper Name: {}", paper, name);
    println!("Group ID: {}, Group Name: {}", group, group_name);
    Ok(())
}

fn collect_files(path: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
