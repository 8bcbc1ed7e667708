//! # tiered-index core
//!
//! Shared, WASM-safe logic for the tiered knowledge index: the record
//! model, the store abstraction, identifier resolution, summary-tree
//! flattening, cross-tier query fusion, and tenant-scoped cascading
//! deletion.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Backends plug in through [`store::Store`]
//! and embedding models through [`embedding::Embedder`].
//!
//! ## Tiers
//!
//! | Tier | Collection | Provenance |
//! |------|------------|------------|
//! | Base | `chunk` | the chunk's own paper and group |
//! | Roll-up | `summary` | papers of every base chunk under the summary |
//! | Graph | `community_report` | papers of the chunks the report is grounded in |

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod resolve;
pub mod search;
pub mod store;
pub mod summary_tree;
pub mod tenancy;

pub use context::{ActiveContext, Tenant};
pub use error::IndexError;
pub use index::Index;
pub use models::{Record, RecordId, RecordKind};
pub use store::{Store, TenantScope};
