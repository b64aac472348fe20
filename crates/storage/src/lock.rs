//! Advisory lock file: `<path>.lock~`.
//!
//! Existence of the lock file means some process owns the database. On
//! unix the lock is a symlink to the database basename, since `symlink`
//! is atomic and needs no extra syscalls; elsewhere an atomic
//! `create_new` file stands in.
//!
//! The guard releases the lock on drop, which covers normal exit and
//! unwinding. A process killed outright leaves the lock behind; recover
//! by deleting `<path>.lock~` by hand once sure the owner is gone.

use jotfile_core::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Holds the database lock for as long as it lives.
#[derive(Debug)]
pub struct LockFile {
    lock_path: PathBuf,
    held: bool,
}

impl LockFile {
    /// Atomically create `<path>.lock~`. Fails with `DatabaseLocked` if
    /// it already exists.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(db_path);
        let result = {
            #[cfg(unix)]
            {
                let target = db_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| db_path.to_path_buf());
                std::os::unix::fs::symlink(target, &lock_path)
            }
            #[cfg(not(unix))]
            {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&lock_path)
                    .map(|_| ())
            }
        };
        match result {
            Ok(()) => Ok(Self {
                lock_path,
                held: true,
            }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::DatabaseLocked {
                path: db_path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the lock file. Failures are ignored beyond a warning; the
    /// stale lock is then the operator's to clean up.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!("failed to remove lock file {}: {}", self.lock_path.display(), e);
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// `<path>.lock~`.
fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push(".lock~");
    os.into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("jot.db");
        let _lock = LockFile::acquire(&db).unwrap();
        assert!(lock_path_for(&db).symlink_metadata().is_ok());
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("jot.db");
        let _lock = LockFile::acquire(&db).unwrap();

        match LockFile::acquire(&db) {
            Err(Error::DatabaseLocked { path }) => assert_eq!(path, db),
            other => panic!("expected DatabaseLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("jot.db");
        {
            let _lock = LockFile::acquire(&db).unwrap();
        }
        assert!(lock_path_for(&db).symlink_metadata().is_err());
        // Re-acquirable after release.
        let _lock = LockFile::acquire(&db).unwrap();
    }

    #[test]
    fn test_explicit_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("jot.db");
        let mut lock = LockFile::acquire(&db).unwrap();
        lock.release();
        lock.release();
        assert!(lock_path_for(&db).symlink_metadata().is_err());
    }
}
