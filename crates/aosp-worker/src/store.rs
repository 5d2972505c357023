//! Durable artifact store.
//!
//! A flat directory on a mount that outlives the build invocation. Images
//! are copied into [`STAGING_DIR`] on the same mount and renamed into place,
//! then
//! [`ArtifactStore::commit`] flushes them before the invocation returns.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use aosp_protocol::ops::ArtifactEntry;
use thiserror::Error;

/// Subdirectory partial copies are written to. Listing only sees regular
/// files, so in-flight copies never show up.
pub const STAGING_DIR: &str = ".incoming";

/// Errors from artifact store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Not a file name: {0}")]
    InvalidName(PathBuf),
}

/// Result type for artifact store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the store directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store at `root`, creating the directory if missing.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Handle to `root` without touching the filesystem (read-only use).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Regular files directly under the root, sorted by name.
    ///
    /// No recursion and no extension filter. A store that was never written
    /// to lists as empty.
    pub fn list(&self) -> StoreResult<Vec<ArtifactEntry>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(ArtifactEntry::new(name, metadata.len()));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Copy `source` into the store under its own file name, replacing any
    /// previous artifact of that name. Returns the stored entry.
    pub fn copy_in(&self, source: &Path) -> StoreResult<ArtifactEntry> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::InvalidName(source.to_path_buf()))?;

        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;
        let temp_path = staging.join(&name);
        let final_path = self.root.join(&name);

        let size = fs::copy(source, &temp_path)?;
        fs::rename(&temp_path, &final_path)?;

        let entry = ArtifactEntry::new(name, size);
        tracing::info!("  Copied {}: {:.1} MB", entry.name, entry.size_mb());
        Ok(entry)
    }

    /// Flush stored files and the directory itself to durable storage.
    pub fn commit(&self) -> StoreResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                File::open(entry.path())?.sync_all()?;
            }
        }
        #[cfg(unix)]
        File::open(&self.root)?.sync_all()?;

        tracing::debug!(root = %self.root.display(), "artifact store committed");
        Ok(())
    }
}
