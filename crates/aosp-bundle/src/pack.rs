//! Directory → gzip tar packing.

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

use crate::{BundleError, OverlayBlob};

/// Packs one directory tree into an [`OverlayBlob`].
pub struct Packer {
    /// Directory to pack
    source: PathBuf,
    /// Whether to store symlink targets' contents instead of the links
    dereference_symlinks: bool,
}

/// Pack `source` with default settings.
///
/// A missing `source` is not an error: it logs a warning and yields an
/// empty blob.
pub fn pack(source: &Path) -> Result<OverlayBlob, BundleError> {
    Packer::new(source).pack()
}

impl Packer {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dereference_symlinks: false,
        }
    }

    /// Set symlink dereferencing behavior
    pub fn with_dereference_symlinks(mut self, dereference: bool) -> Self {
        self.dereference_symlinks = dereference;
        self
    }

    /// Produce the archive.
    pub fn pack(&self) -> Result<OverlayBlob, BundleError> {
        if !self.source.is_dir() {
            tracing::warn!("Warning: {} not found", self.source.display());
            return Ok(OverlayBlob::empty(self.source.clone()));
        }

        let root = fs::canonicalize(&self.source)?;
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BundleError::NoBaseName(self.source.clone()))?;

        let entries = self.collect_entries(&root)?;

        let encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        let root_dir = PathBuf::from(&root_name);
        append_directory(&mut builder, &root_dir)?;

        for (rel_path, kind) in &entries {
            let archive_path = root_dir.join(rel_path);
            let full_path = root.join(rel_path);

            match kind {
                EntryKind::File { follow } => {
                    let mut contents = Vec::new();
                    let mut file = File::open(&full_path)?;
                    file.read_to_end(&mut contents)?;

                    let mut header = canonical_header(EntryType::Regular);
                    header.set_size(contents.len() as u64);
                    let executable = if *follow {
                        is_executable(&fs::canonicalize(&full_path)?)
                    } else {
                        is_executable(&full_path)
                    };
                    header.set_mode(if executable { 0o755 } else { 0o644 });
                    builder.append_data(&mut header, &archive_path, contents.as_slice())?;
                }
                EntryKind::Directory => {
                    append_directory(&mut builder, &archive_path)?;
                }
                EntryKind::Symlink(target) => {
                    let mut header = canonical_header(EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    builder.append_link(&mut header, &archive_path, target)?;
                }
            }
        }

        let encoder = builder.into_inner()?;
        let bytes = finish(encoder)?;

        tracing::info!(
            "Packaged {}: {:.1} KB",
            self.source.display(),
            bytes.len() as f64 / 1024.0
        );

        Ok(OverlayBlob::new(self.source.clone(), root_name, bytes))
    }

    /// Collect every entry under `root` in sorted order.
    fn collect_entries(&self, root: &Path) -> Result<BTreeMap<PathBuf, EntryKind>, BundleError> {
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();

            let rel_path = match path.strip_prefix(root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };

            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                let target = fs::read_link(path)?;
                let resolved = if target.is_absolute() {
                    target.clone()
                } else {
                    path.parent().unwrap_or(root).join(&target)
                };

                let canonical = resolved.canonicalize().unwrap_or(resolved);
                if !canonical.starts_with(root) {
                    return Err(BundleError::SymlinkEscapesRoot {
                        path: path.to_path_buf(),
                    });
                }

                if self.dereference_symlinks && canonical.is_file() {
                    EntryKind::File { follow: true }
                } else {
                    EntryKind::Symlink(target)
                }
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File { follow: false }
            };

            entries.insert(rel_path, kind);
        }

        Ok(entries)
    }
}

enum EntryKind {
    File { follow: bool },
    Directory,
    Symlink(PathBuf),
}

/// Header with zeroed mtime/uid/gid so identical trees pack identically.
fn canonical_header(entry_type: EntryType) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn append_directory(
    builder: &mut Builder<GzEncoder<Vec<u8>>>,
    path: &Path,
) -> Result<(), BundleError> {
    let mut header = canonical_header(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    builder.append_data(&mut header, path, &[] as &[u8])?;
    Ok(())
}

fn finish(encoder: GzEncoder<Vec<u8>>) -> Result<Vec<u8>, BundleError> {
    Ok(encoder.finish()?)
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    false
}
