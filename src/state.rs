//! Side files that remember the active database and group.
//!
//! Each file holds a single plain-text value and is overwritten on every
//! write. A missing or blank file means the value is unset.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use tiered_index_core::{ActiveContext, RecordId};

const DB_PATH_FILE: &str = "db_path";
const GROUP_ID_FILE: &str = "group_id";

pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read both side files into an explicit context.
    pub fn load(&self) -> Result<ActiveContext> {
        Ok(ActiveContext {
            db_path: self.db_path()?,
            group: self.group()?,
        })
    }

    pub fn db_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.read(DB_PATH_FILE)?.map(PathBuf::from))
    }

    pub fn set_db_path(&self, path: &Path) -> Result<()> {
        self.write(DB_PATH_FILE, &path.display().to_string())
    }

    pub fn clear_db_path(&self) -> Result<()> {
        self.remove(DB_PATH_FILE)
    }

    /// The remembered group; an unparseable value counts as unset.
    pub fn group(&self) -> Result<Option<RecordId>> {
        Ok(self.read(GROUP_ID_FILE)?.and_then(|v| v.parse().ok()))
    }

    pub fn set_group(&self, group: RecordId) -> Result<()> {
        self.write(GROUP_ID_FILE, &group.to_string())
    }

    pub fn clear_group(&self) -> Result<()> {
        self.remove(GROUP_ID_FILE)
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let value = content.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state dir: {}", self.dir.display()))?;
        let path = self.dir.join(name);
        std::fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}
