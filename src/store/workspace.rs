use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{HealthError, Result};
use crate::store::sqlite::SqliteStore;

pub const DIR_NAME: &str = ".healthcheck";

/// The `.healthcheck` directory: config, store database and run lock.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn open(base: &Path) -> Result<Self> {
        let root = base.join(DIR_NAME);
        if !root.join("config.yaml").exists() {
            return Err(HealthError::NotInitialized);
        }
        Ok(Self { root })
    }

    /// Create the directory with a default config and an empty store.
    pub fn init(base: &Path) -> Result<Self> {
        let root = base.join(DIR_NAME);
        if root.join("config.yaml").exists() {
            return Err(HealthError::AlreadyInitialized);
        }

        fs::create_dir_all(&root)?;
        fs::write(
            root.join("config.yaml"),
            serde_yaml::to_string(&Config::default())?,
        )?;

        let workspace = Self { root };
        workspace.store()?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("store.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("run.lock")
    }

    pub fn store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path())
    }

    /// Load the config file with environment overrides applied.
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.config_path(), |key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_then_open() {
        let dir = tempdir().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();
        assert!(ws.config_path().exists());
        assert!(ws.db_path().exists());

        let reopened = Workspace::open(dir.path()).unwrap();
        assert_eq!(reopened.root(), ws.root());
    }

    #[test]
    fn double_init_fails() {
        let dir = tempdir().unwrap();
        Workspace::init(dir.path()).unwrap();
        assert!(matches!(
            Workspace::init(dir.path()),
            Err(HealthError::AlreadyInitialized)
        ));
    }

    #[test]
    fn open_requires_init() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Workspace::open(dir.path()),
            Err(HealthError::NotInitialized)
        ));
    }
}
