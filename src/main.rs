//! # Tiered Index CLI (`tix`)
//!
//! The `tix` binary manages tenants, ingests papers, records graph and
//! roll-up output, and runs fused queries.
//!
//! ## Usage
//!
//! ```bash
//! tix --config ./config/tix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tix init` | Create the SQLite database and schema |
//! | `tix db use/show/reset` | Switch the active database |
//! | `tix group ...` | Create, select, inspect, and delete groups |
//! | `tix paper add <path>` | Ingest a file or directory into a group |
//! | `tix paper extract <path>` | Texts to feed graph extraction |
//! | `tix relationship add` | Store an extracted relationship |
//! | `tix report add` | Store a community report |
//! | `tix summary add` | Store a summary-tree node |
//! | `tix resolve <kind> <text>` | Map text back to a stored record |
//! | `tix query <mode> "<text>"` | Fused similarity search |
//! | `tix stats` | Record counts per collection |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tiered_index::session::Session;
use tiered_index::{config, db_cmd, graph, groups, ingest, logger, migrate, query, stats};
use tiered_index_core::ingest::NewRelationship;
use tiered_index_core::search::QueryMode;
use tiered_index_core::{RecordId, RecordKind};

/// Tiered Index CLI: a multi-tenant index of chunks, graph reports, and
/// summary roll-ups with fused retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tix",
    about = "Tiered Index: multi-tenant chunk, graph, and roll-up retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `records` and `sequences`
    /// tables. Idempotent.
    Init,

    /// Choose which database later commands use.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Manage groups (tenants).
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Ingest papers.
    Paper {
        #[command(subcommand)]
        action: PaperAction,
    },

    /// Store relationships from graph extraction.
    Relationship {
        #[command(subcommand)]
        action: RelationshipAction,
    },

    /// Store community reports.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Store summary-tree nodes.
    Summary {
        #[command(subcommand)]
        action: SummaryAction,
    },

    /// Resolve free text to the id of a stored record.
    ///
    /// Prints the id and the matching tier, or `0 (not found)`.
    Resolve {
        /// Record kind: group, paper, chunk, relationship, report, summary.
        kind: RecordKind,

        /// Text to resolve.
        text: String,

        /// Compare against this metadata field instead of the content.
        #[arg(long)]
        field: Option<String>,
    },

    /// Fused similarity search.
    ///
    /// Modes: 1 = summaries + community reports, 2 = base chunks + summaries,
    /// 3 = community reports, 4 = base chunks.
    Query {
        /// Query mode (1-4).
        mode: QueryMode,

        /// The query text.
        text: String,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<i64>,

        /// Restrict to a group; `-1` searches all groups. Defaults to the
        /// active group.
        #[arg(long, allow_hyphen_values = true)]
        group: Option<i64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show record counts per collection.
    Stats,
}

#[derive(Subcommand)]
enum DbAction {
    /// Use the database at PATH (created if missing).
    Use { path: PathBuf },
    /// Print the active database path.
    Show,
    /// Go back to the database configured in `[db].path`.
    Reset,
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create a group and print its id.
    Create { name: String },
    /// List all groups; the active one is marked with `*`.
    List,
    /// Make a group the active tenant.
    Use { id: RecordId },
    /// Unset the active group.
    Clear,
    /// Show how many records a group owns in each collection.
    Stats { id: Option<RecordId> },
    /// Delete a group's records.
    ///
    /// Graph and roll-up records are removed unless kept; the group, its
    /// papers, and its chunks are removed only when neither is kept.
    Delete {
        id: RecordId,
        /// Keep relationships and community reports.
        #[arg(long)]
        keep_graph: bool,
        /// Keep the summary tree.
        #[arg(long)]
        keep_rollup: bool,
    },
}

#[derive(Subcommand)]
enum PaperAction {
    /// Add a file, or every matching file under a directory.
    Add {
        path: PathBuf,
        /// Target group (defaults to the active group).
        #[arg(long)]
        group: Option<RecordId>,
        /// Denoised text for a single file, one `---`-separated section per chunk.
        #[arg(long)]
        denoised: Option<PathBuf>,
    },
    /// Print the stored texts graph extraction should read for a paper file.
    Extract { path: PathBuf },
    /// Show a paper's name and owning group.
    Show {
        id: RecordId,
        /// Keep the file extension in the name.
        #[arg(long)]
        with_suffix: bool,
    },
}

#[derive(Subcommand)]
enum RelationshipAction {
    /// Store a relationship, linking it to the chunk it was extracted from.
    Add {
        /// Chunk text the relationship came from.
        #[arg(long)]
        chunk_text: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value_t = 1.0)]
        strength: f64,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Store a community report grounded in the active group.
    Add {
        /// Extraction input containing `</target><description>…</description>` markers.
        #[arg(long)]
        extraction: PathBuf,
        /// File holding the report narrative.
        #[arg(long)]
        report: PathBuf,
    },
}

#[derive(Subcommand)]
enum SummaryAction {
    /// Store a summary node.
    Add {
        #[arg(long)]
        text: String,
        /// Comma-separated child ids (chunk ids with --from-base, else summary ids).
        #[arg(long)]
        children: String,
        /// Children are base chunks.
        #[arg(long)]
        from_base: bool,
        /// This node is a root of the tree.
        #[arg(long)]
        root: bool,
        /// Owning group (defaults to the active group).
        #[arg(long)]
        group: Option<RecordId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logger::init(&cfg.logging.level)?;
    let session = Session::load(cfg)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&session.db_path()).await?;
            println!("Database initialized successfully.");
        }
        Commands::Db { action } => match action {
            DbAction::Use { path } => db_cmd::run_use(&session, &path).await?,
            DbAction::Show => db_cmd::run_show(&session),
            DbAction::Reset => db_cmd::run_reset(&session)?,
        },
        Commands::Group { action } => match action {
            GroupAction::Create { name } => groups::run_create(&session, &name).await?,
            GroupAction::List => groups::run_list(&session).await?,
            GroupAction::Use { id } => groups::run_use(&session, id).await?,
            GroupAction::Clear => groups::run_clear(&session)?,
            GroupAction::Stats { id } => groups::run_stats(&session, id).await?,
            GroupAction::Delete {
                id,
                keep_graph,
                keep_rollup,
            } => groups::run_delete(&session, id, keep_graph, keep_rollup).await?,
        },
        Commands::Paper { action } => match action {
            PaperAction::Add {
                path,
                group,
                denoised,
            } => ingest::run_add(&session, &path, group, denoised.as_deref()).await?,
            PaperAction::Extract { path } => ingest::run_extract(&session, &path).await?,
            PaperAction::Show { id, with_suffix } => {
                ingest::run_show(&session, id, with_suffix).await?
            }
        },
        Commands::Relationship { action } => match action {
            RelationshipAction::Add {
                chunk_text,
                source,
                target,
                description,
                strength,
            } => {
                let rel = NewRelationship {
                    link_text: &chunk_text,
                    source_entity_name: &source,
                    target_entity_name: &target,
                    description: &description,
                    strength,
                };
                graph::run_add_relationship(&session, &rel).await?;
            }
        },
        Commands::Report { action } => match action {
            ReportAction::Add { extraction, report } => {
                graph::run_add_report(&session, &extraction, &report).await?
            }
        },
        Commands::Summary { action } => match action {
            SummaryAction::Add {
                text,
                children,
                from_base,
                root,
                group,
            } => {
                let children = graph::parse_id_list(&children)?;
                graph::run_add_summary(&session, &text, &children, from_base, root, group).await?;
            }
        },
        Commands::Resolve { kind, text, field } => {
            graph::run_resolve(&session, kind, &text, field.as_deref()).await?;
        }
        Commands::Query {
            mode,
            text,
            top_k,
            group,
            json,
        } => {
            query::run_query(&session, mode, &text, top_k, group, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&session).await?;
        }
    }

    Ok(())
}
