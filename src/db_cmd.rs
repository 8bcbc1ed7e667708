//! `tix db`: switch between index databases.
//!
//! The active database is remembered in the `db_path` side file and falls
//! back to `[db].path` when unset.

use anyhow::Result;
use std::path::Path;

use crate::migrate;
use crate::session::Session;

/// Point later commands at `path`, creating its schema.
pub async fn run_use(session: &Session, path: &Path) -> Result<()> {
    migrate::run_migrations(path).await?;
    session.state.set_db_path(path)?;
    // Group ids are per database.
    session.state.clear_group()?;
    println!("Active database: {}", path.display());
    Ok(())
}

pub fn run_show(session: &Session) {
    let origin = if session.ctx.db_path.is_some() {
        "set by `tix db use`"
    } else {
        "from config"
    };
    println!("{} ({})", session.db_path().display(), origin);
}

pub fn run_reset(session: &Session) -> Result<()> {
    session.state.clear_db_path()?;
    session.state.clear_group()?;
    println!("Active database reset to {}", session.config.db.path.display());
    Ok(())
}
