//! OVERLAY phase: place local components into the synced tree and repair it.
//!
//! Nothing here ends the build. Missing bundles were already reduced to empty
//! blobs on the host, patch failures are logged and skipped, and the two
//! repair steps always run.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use aosp_bundle::{unpack, OverlayBlob};

use crate::tools::PatchApplier;

use super::{OrchestratorError, OverlaySet};

/// Mount point of the device configuration bundle.
pub const DEVICE_MOUNT: &str = "device";
/// Mount point of the system service bundle.
pub const SERVICES_MOUNT: &str = "packages/services";
/// Mount point of the SDK bundle.
pub const SDK_MOUNT: &str = "frameworks";
/// The interface bundle is unpacked into both of these.
pub const AIDL_MOUNTS: [&str; 2] = ["packages/services/AgentService", "frameworks/AgentSDK"];

/// Patch subdirectory inside the patch bundle, and the repository it targets.
pub const PATCH_SET: &str = "frameworks_base";
pub const PATCH_TARGET: &str = "frameworks/base";

/// Upstream projects whose license file is not where the build expects it.
pub const LICENSE_FIXES: [(&str, &str); 2] = [
    ("external/kotlinx.coroutines", "LICENSE.txt"),
    ("external/kotlinc", "license/LICENSE.txt"),
];

pub const POLICY_FILE: &str = "build/make/core/build_broken_config.mk";
pub const POLICY_SNIPPET: &str =
    "\n# Added by AGI-Android OS builder\nBUILD_BROKEN_MISSING_REQUIRED_MODULES := true\n";

/// What the OVERLAY phase did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySummary {
    /// Destinations a non-empty bundle was unpacked into.
    pub unpacked: Vec<PathBuf>,
    pub licenses_fixed: Vec<PathBuf>,
    pub patches_applied: Vec<String>,
    pub patches_failed: Vec<String>,
}

/// Run the whole OVERLAY phase.
pub fn apply_overlays(
    root: &Path,
    staging: &Path,
    overlays: &OverlaySet,
    patcher: &dyn PatchApplier,
) -> Result<OverlaySummary, OrchestratorError> {
    tracing::info!("=== Phase 2: Applying AGI components ===");
    let mut summary = OverlaySummary::default();

    tracing::info!("Applying device configuration...");
    place(&overlays.device_config, &root.join(DEVICE_MOUNT), &mut summary)?;
    for (marker, label) in [
        ("device/agi/agi_arm64/BoardConfig.mk", "agi_arm64 device with BoardConfig.mk"),
        ("device/agi/os/agi_os_arm64.mk", "os product config (legacy)"),
    ] {
        if root.join(marker).exists() {
            tracing::info!("  Found {}", label);
        }
    }

    tracing::info!("Applying AgentSystemService...");
    place(&overlays.system_service, &root.join(SERVICES_MOUNT), &mut summary)?;

    tracing::info!("Applying AGI-OS SDK...");
    place(&overlays.sdk, &root.join(SDK_MOUNT), &mut summary)?;

    if !overlays.aidl.is_empty() {
        tracing::info!("Applying AIDL interfaces...");
        for mount in AIDL_MOUNTS {
            place(&overlays.aidl, &root.join(mount), &mut summary)?;
        }
    }

    tracing::info!("Fixing LICENSE files...");
    summary.licenses_fixed = fix_licenses(root)?;

    tracing::info!("Adding BUILD_BROKEN_MISSING_REQUIRED_MODULES to build config...");
    append_build_policy(root)?;

    if !overlays.patches.is_empty() {
        tracing::info!("Applying patches...");
        reset_staging(staging)?;
        unpack(&overlays.patches, staging)?;
        let (applied, failed) = apply_patches(
            root,
            staging,
            overlays.patches.root_name(),
            patcher,
        )?;
        summary.patches_applied = applied;
        summary.patches_failed = failed;
        if let Err(e) = fs::remove_dir_all(staging) {
            tracing::warn!("could not remove {}: {}", staging.display(), e);
        }
    }

    Ok(summary)
}

fn place(
    blob: &OverlayBlob,
    dest: &Path,
    summary: &mut OverlaySummary,
) -> Result<(), OrchestratorError> {
    if blob.is_empty() {
        tracing::warn!("  Nothing to apply at {}", dest.display());
        return Ok(());
    }
    fs::create_dir_all(dest)?;
    unpack(blob, dest)?;
    summary.unpacked.push(dest.to_path_buf());
    Ok(())
}

/// Empty the staging directory so only this bundle's patches are seen.
fn reset_staging(staging: &Path) -> io::Result<()> {
    match fs::remove_dir_all(staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(staging)
}

/// Copy each misplaced license file to `LICENSE`, unless `LICENSE` already
/// exists. Running this twice changes nothing the second time.
pub fn fix_licenses(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut fixed = Vec::new();
    for (project, source) in LICENSE_FIXES {
        let project_dir = root.join(project);
        let src = project_dir.join(source);
        let dst = project_dir.join("LICENSE");
        if src.exists() && !dst.exists() {
            fs::copy(&src, &dst)?;
            tracing::info!("  Fixed {}", dst.display());
            fixed.push(dst);
        }
    }
    Ok(fixed)
}

/// Append the missing-required-modules policy to the build config.
///
/// This is a blind append: every call adds another copy of the snippet.
pub fn append_build_policy(root: &Path) -> io::Result<()> {
    let path = root.join(POLICY_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(POLICY_SNIPPET.as_bytes())?;
    tracing::info!("  Added to {}", path.display());
    Ok(())
}

/// Where the patch files ended up after unpacking into `staging`.
fn patch_dir(staging: &Path, bundle_root: &str) -> Option<PathBuf> {
    let candidates = [
        staging.join(bundle_root).join(PATCH_SET),
        staging.join(PATCH_SET),
    ];
    candidates.into_iter().find(|dir| dir.is_dir())
}

/// Apply every `*.patch` of the patch set, in name order, inside
/// `frameworks/base`. Returns the names applied and the names that failed.
pub fn apply_patches(
    root: &Path,
    staging: &Path,
    bundle_root: &str,
    patcher: &dyn PatchApplier,
) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut applied = Vec::new();
    let mut failed = Vec::new();

    let dir = match patch_dir(staging, bundle_root) {
        Some(dir) => dir,
        None => {
            tracing::warn!("No {} patch set in bundle", PATCH_SET);
            return Ok((applied, failed));
        }
    };

    let mut patches: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "patch"))
        .collect();
    patches.sort();

    let repo = root.join(PATCH_TARGET);
    for patch in patches {
        let name = patch
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::info!("  Applying {}...", name);
        match patcher.apply(&repo, &patch) {
            Ok(0) => applied.push(name),
            Ok(code) => {
                tracing::warn!("  {} did not apply (exit code {}), skipping", name, code);
                failed.push(name);
            }
            Err(e) => {
                tracing::warn!("  {} could not be applied: {}, skipping", name, e);
                failed.push(name);
            }
        }
    }

    Ok((applied, failed))
}
