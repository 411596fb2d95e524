use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{HealthError, Result};

/// Hold an exclusive advisory lock on `path` for as long as the guard lives.
pub struct RunLock {
    file: File,
}

impl RunLock {
    /// Fails with `Locked` instead of waiting when another process holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| HealthError::Locked(path.display().to_string()))?;

        Ok(Self { file })
    }

    pub fn release(self) -> Result<()> {
        self.file.unlock()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("run.lock");

        let guard = RunLock::acquire(&lock_path).unwrap();
        assert!(matches!(
            RunLock::acquire(&lock_path),
            Err(HealthError::Locked(_))
        ));
        guard.release().unwrap();
        let _guard = RunLock::acquire(&lock_path).unwrap();
    }
}
