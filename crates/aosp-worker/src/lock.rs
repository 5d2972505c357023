//! Exclusive lock on the source tree.
//!
//! One full build owns the source root at a time. The lock is an advisory
//! `flock` on a file inside the root, held for the lifetime of
//! [`SourceLock`] and released when it is dropped (or the worker dies).

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Lock file name inside the source root.
pub const LOCK_FILENAME: &str = ".aosp-worker.lock";

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another build holds {0}")]
    Held(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Held lock on a source root.
#[derive(Debug)]
pub struct SourceLock {
    path: PathBuf,
    #[cfg(unix)]
    _file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl SourceLock {
    /// Take the lock without waiting. Creates `root` if needed.
    pub fn try_acquire(root: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILENAME);
        let file = Self::lock_file(&path)?;
        tracing::debug!(path = %path.display(), "source lock acquired");
        Ok(Self { path, _file: file })
    }

    #[cfg(unix)]
    fn lock_file(path: &Path) -> Result<nix::fcntl::Flock<File>, LockError> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => Ok(locked),
            Err((_, Errno::EWOULDBLOCK)) => Err(LockError::Held(path.to_path_buf())),
            Err((_, errno)) => Err(LockError::Io(io::Error::from(errno))),
        }
    }

    #[cfg(not(unix))]
    fn lock_file(path: &Path) -> Result<File, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::Held(path.to_path_buf()))
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(not(unix))]
impl Drop for SourceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("aosp");

        let lock = SourceLock::try_acquire(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(lock.path(), root.join(LOCK_FILENAME));
    }

    #[test]
    fn test_second_lock_is_refused() {
        let dir = TempDir::new().unwrap();

        let _held = SourceLock::try_acquire(dir.path()).unwrap();
        let err = SourceLock::try_acquire(dir.path()).unwrap_err();
        assert!(matches!(err, LockError::Held(_)));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();

        drop(SourceLock::try_acquire(dir.path()).unwrap());
        assert!(SourceLock::try_acquire(dir.path()).is_ok());
    }
}
