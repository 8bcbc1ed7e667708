//! Per-invocation context for CLI commands.
//!
//! Combines the loaded config with the side-file state into an explicit
//! [`ActiveContext`], and opens the index it points at.

use anyhow::Result;
use std::path::PathBuf;

use tiered_index_core::context::Tenant;
use tiered_index_core::ingest::{Ingestor, SubChunking};
use tiered_index_core::resolve::Resolver;
use tiered_index_core::{ActiveContext, Index};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use crate::state::StateFiles;

pub struct Session {
    pub config: Config,
    pub state: StateFiles,
    pub ctx: ActiveContext,
}

impl Session {
    pub fn load(config: Config) -> Result<Self> {
        let state = StateFiles::new(&config.state.dir);
        let ctx = state.load()?;
        Ok(Self { config, state, ctx })
    }

    /// Active database: the side file if set, else `[db].path`.
    pub fn db_path(&self) -> PathBuf {
        self.ctx
            .db_path
            .clone()
            .unwrap_or_else(|| self.config.db.path.clone())
    }

    pub async fn open(&self) -> Result<Index<SqliteStore>> {
        db::open_index(&self.config, &self.db_path()).await
    }

    pub async fn tenant(&self, index: &Index<SqliteStore>) -> Tenant {
        Tenant::resolve(index, &self.ctx).await
    }

    pub fn resolver<'a>(&self, index: &'a Index<SqliteStore>, tenant: Tenant) -> Resolver<'a, SqliteStore> {
        Resolver::new(index, tenant).with_max_distance(self.config.resolver.max_distance)
    }

    pub fn ingestor<'a>(&self, index: &'a Index<SqliteStore>, tenant: Tenant) -> Ingestor<'a, SqliteStore> {
        Ingestor::new(index, tenant)
            .with_max_distance(self.config.resolver.max_distance)
            .with_sub_chunking(SubChunking {
                min_tokens: self.config.chunking.min_sub_chunk_tokens,
                ..SubChunking::default()
            })
    }
}
