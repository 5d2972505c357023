//! gzip tar → directory unpacking.

use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Component, Path};
use tar::Archive;

use crate::{BundleError, OverlayBlob};

/// What an unpack call wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Top-level names created or overwritten under the destination.
    pub roots: BTreeSet<String>,
    /// Number of regular files extracted.
    pub files: usize,
}

impl UnpackSummary {
    /// True when nothing was extracted (empty blob).
    pub fn is_noop(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Extract `blob` under `dest`.
///
/// An empty blob is a no-op: `dest` is neither created nor touched.
/// Otherwise `dest` is created if missing and the full tree is extracted,
/// overwriting files that already exist.
pub fn unpack(blob: &OverlayBlob, dest: &Path) -> Result<UnpackSummary, BundleError> {
    let mut summary = UnpackSummary::default();
    if blob.is_empty() {
        return Ok(summary);
    }

    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(blob.bytes())));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        if let Some(Component::Normal(first)) = path.components().next() {
            summary.roots.insert(first.to_string_lossy().to_string());
        }
        let is_file = entry.header().entry_type().is_file();

        if !entry.unpack_in(dest)? {
            return Err(BundleError::EntryEscapesDestination { path });
        }
        if is_file {
            summary.files += 1;
        }
    }

    tracing::info!("  Extracted to {}", dest.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    /// Relative path → contents for every regular file under `root`.
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    fn create_service_tree(parent: &Path) -> PathBuf {
        let root = parent.join("system-service");
        fs::create_dir_all(root.join("src/com/agi/os/session")).unwrap();
        fs::create_dir_all(root.join("src/com/agi/os/empty")).unwrap();
        fs::write(root.join("Android.bp"), "android_app { name: \"AgentService\" }\n").unwrap();
        fs::write(
            root.join("src/com/agi/os/session/SessionManager.kt"),
            "class SessionManager\n",
        )
        .unwrap();
        fs::write(root.join("src/binary.dat"), [0u8, 159, 146, 150]).unwrap();
        root
    }

    #[test]
    fn test_round_trip_reproduces_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let root = create_service_tree(src.path());

        let blob = pack(&root).unwrap();
        let dest = dst.path().join("packages/services");
        let summary = unpack(&blob, &dest).unwrap();

        assert_eq!(snapshot(&root), snapshot(&dest.join("system-service")));
        assert!(dest.join("system-service/src/com/agi/os/empty").is_dir());
        assert_eq!(summary.roots.iter().collect::<Vec<_>>(), vec!["system-service"]);
        assert_eq!(summary.files, 3);
    }

    #[test]
    fn test_empty_blob_is_noop() {
        let dst = TempDir::new().unwrap();
        let dest = dst.path().join("never-created");

        let summary = unpack(&OverlayBlob::empty("/missing"), &dest).unwrap();

        assert!(summary.is_noop());
        assert!(!dest.exists());
    }

    #[test]
    fn test_unpack_overwrites_existing_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let root = create_service_tree(src.path());
        let blob = pack(&root).unwrap();

        fs::create_dir_all(dst.path().join("system-service")).unwrap();
        fs::write(dst.path().join("system-service/Android.bp"), "stale").unwrap();
        fs::write(dst.path().join("system-service/keep.txt"), "untouched").unwrap();

        unpack(&blob, dst.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst.path().join("system-service/Android.bp")).unwrap(),
            "android_app { name: \"AgentService\" }\n"
        );
        assert_eq!(
            fs::read_to_string(dst.path().join("system-service/keep.txt")).unwrap(),
            "untouched"
        );
    }

    #[test]
    fn test_same_blob_into_two_destinations() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let aidl = src.path().join("aidl");
        fs::create_dir_all(aidl.join("com/agi/os")).unwrap();
        fs::write(aidl.join("com/agi/os/SessionConfig.kt"), "data class SessionConfig").unwrap();

        let blob = pack(&aidl).unwrap();
        let first = dst.path().join("packages/services/AgentService");
        let second = dst.path().join("frameworks/AgentSDK");
        unpack(&blob, &first).unwrap();
        unpack(&blob, &second).unwrap();

        assert!(first.join("aidl/com/agi/os/SessionConfig.kt").is_file());
        assert!(second.join("aidl/com/agi/os/SessionConfig.kt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_survives() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let root = src.path().join("tools");
        fs::create_dir(&root).unwrap();
        let script = root.join("envsetup.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        unpack(&pack(&root).unwrap(), dst.path()).unwrap();

        let mode = fs::metadata(dst.path().join("tools/envsetup.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0);
    }
}
