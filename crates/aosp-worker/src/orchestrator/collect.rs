//! COLLECT phase: move the built images into the durable store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aosp_protocol::ops::ArtifactEntry;

use crate::store::ArtifactStore;

use super::OrchestratorError;

/// Build output root, relative to the source tree.
pub const PRODUCT_OUT: &str = "out/target/product";

/// The image whose presence marks a product directory as the build output.
pub const PRIMARY_IMAGE: &str = "system.img";

/// Images copied to the store, when present.
pub const ALLOWED_IMAGES: [&str; 4] = ["system.img", "vbmeta.img", "boot.img", "vendor.img"];

/// First product directory (in name order) containing the primary image.
pub fn find_output_dir(root: &Path) -> io::Result<Option<PathBuf>> {
    let product_root = root.join(PRODUCT_OUT);
    let read_dir = match fs::read_dir(&product_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut products: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    products.sort();

    Ok(products
        .into_iter()
        .find(|dir| dir.join(PRIMARY_IMAGE).is_file()))
}

/// Copy the allow-listed images into the store and commit it.
///
/// Returns `None` when no product directory holds the primary image; nothing
/// is copied in that case.
pub fn collect_artifacts(
    root: &Path,
    store: &ArtifactStore,
) -> Result<Option<Vec<ArtifactEntry>>, OrchestratorError> {
    tracing::info!("=== Phase 4: Saving artifacts ===");

    let out_dir = match find_output_dir(root)? {
        Some(dir) => dir,
        None => {
            tracing::error!("No {} under {}", PRIMARY_IMAGE, root.join(PRODUCT_OUT).display());
            return Ok(None);
        }
    };
    tracing::info!("Build output: {}", out_dir.display());

    let mut copied = Vec::new();
    for image in ALLOWED_IMAGES {
        let src = out_dir.join(image);
        if src.is_file() {
            tracing::info!("Copying {}...", image);
            copied.push(store.copy_in(&src)?);
        }
    }

    store.commit()?;
    tracing::info!("Artifacts saved to volume!");

    for entry in store.list()? {
        tracing::info!("  {}: {:.1} MB", entry.name, entry.size_mb());
    }

    Ok(Some(copied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_no_product_dir_collects_nothing() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let store = ArtifactStore::open(out.path()).unwrap();

        assert!(collect_artifacts(src.path(), &store).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_product_without_system_image_collects_nothing() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(src.path(), "out/target/product/generic/boot.img", b"boot");
        let store = ArtifactStore::open(out.path()).unwrap();

        assert!(collect_artifacts(src.path(), &store).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_only_allow_listed_images_copied() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let product = "out/target/product/agi_os_x86_64";
        write(src.path(), &format!("{}/system.img", product), b"system");
        write(src.path(), &format!("{}/vbmeta.img", product), b"vbmeta");
        write(src.path(), &format!("{}/userdata.img", product), b"userdata");
        write(src.path(), &format!("{}/ramdisk.img", product), b"ramdisk");
        let store = ArtifactStore::open(out.path()).unwrap();

        let copied = collect_artifacts(src.path(), &store).unwrap().unwrap();

        let names: Vec<&str> = copied.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["system.img", "vbmeta.img"]);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_first_product_with_system_image_wins() {
        let src = TempDir::new().unwrap();
        write(src.path(), "out/target/product/a_generic/boot.img", b"a");
        write(src.path(), "out/target/product/b_agi/system.img", b"b");
        write(src.path(), "out/target/product/c_other/system.img", b"c");

        let dir = find_output_dir(src.path()).unwrap().unwrap();
        assert!(dir.ends_with("b_agi"));
    }
}
