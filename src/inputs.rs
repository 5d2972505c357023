//! Local component packaging
//!
//! Resolves the five local component directories, packs each into an
//! overlay bundle and assembles the `full_build` request around them.

use std::path::{Path, PathBuf};

use aosp_bundle::{pack, BundleError, OverlayBlob};
use aosp_protocol::ops::{EncodedBundle, FullBuildRequest, OverlayPayload, ResourceProfile};

use crate::config::{PathSettings, Settings};

/// Absolute locations of the local component directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInputs {
    pub device_config: PathBuf,
    pub system_service: PathBuf,
    pub sdk: PathBuf,
    pub aidl: PathBuf,
    pub patches: PathBuf,
}

impl LocalInputs {
    /// Resolve configured paths; relative ones are taken from `base_dir`.
    pub fn resolve(paths: &PathSettings, base_dir: &Path) -> Self {
        let at = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };
        Self {
            device_config: at(&paths.device_config),
            system_service: at(&paths.system_service),
            sdk: at(&paths.sdk),
            aidl: at(&paths.aidl),
            patches: at(&paths.patches),
        }
    }

    /// Pack every directory. Missing ones are warned about and left out.
    pub fn pack(&self) -> Result<OverlayPayload, BundleError> {
        Ok(OverlayPayload {
            device_config: encode(&pack(&self.device_config)?),
            system_service: encode(&pack(&self.system_service)?),
            sdk: encode(&pack(&self.sdk)?),
            aidl: encode(&pack(&self.aidl)?),
            patches: encode(&pack(&self.patches)?),
        })
    }
}

/// Transport form of a blob; an empty blob is not sent at all.
pub fn encode(blob: &OverlayBlob) -> Option<EncodedBundle> {
    if blob.is_empty() {
        return None;
    }
    Some(EncodedBundle {
        origin: blob.origin().to_string_lossy().to_string(),
        root_name: blob.root_name().to_string(),
        data_b64: blob.to_base64(),
        sha256: blob.sha256(),
    })
}

/// Assemble the `full_build` request for one invocation.
pub fn build_request(settings: &Settings, overlays: OverlayPayload) -> FullBuildRequest {
    FullBuildRequest {
        target: settings.target.clone(),
        source: settings.source.clone(),
        build_jobs: settings.build_jobs,
        resources: ResourceProfile::full_build(),
        overlays,
    }
}
