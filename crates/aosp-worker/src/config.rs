//! Worker configuration.

use std::path::PathBuf;

use aosp_protocol::{PROTOCOL_MAX, PROTOCOL_MIN};

use crate::orchestrator::WorkspaceLayout;

/// Environment variable overriding the source tree location.
pub const ENV_SOURCE_ROOT: &str = "AOSP_WORKER_SOURCE_ROOT";
/// Environment variable overriding the durable artifact store mount.
pub const ENV_ARTIFACTS_ROOT: &str = "AOSP_WORKER_ARTIFACTS_ROOT";
/// Environment variable overriding where the patch bundle is unpacked.
pub const ENV_PATCH_STAGING: &str = "AOSP_WORKER_PATCH_STAGING";
/// Environment variable enabling per-phase log files.
pub const ENV_LOG_DIR: &str = "AOSP_WORKER_LOG_DIR";

/// Worker configuration settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Minimum supported protocol version.
    pub protocol_min: i32,
    /// Maximum supported protocol version.
    pub protocol_max: i32,
    /// Where the source tree is synced (ephemeral disk).
    pub source_root: PathBuf,
    /// Mount point of the durable artifact store.
    pub artifacts_root: PathBuf,
    /// Scratch directory for the patch bundle.
    pub patch_staging: PathBuf,
    /// Directory receiving full child-process logs, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            protocol_min: PROTOCOL_MIN,
            protocol_max: PROTOCOL_MAX,
            source_root: PathBuf::from("/aosp"),
            artifacts_root: PathBuf::from("/artifacts"),
            patch_staging: PathBuf::from("/tmp/patches"),
            log_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Defaults, overridden by `AOSP_WORKER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(value) = non_empty(ENV_SOURCE_ROOT) {
            config.source_root = PathBuf::from(value);
        }
        if let Some(value) = non_empty(ENV_ARTIFACTS_ROOT) {
            config.artifacts_root = PathBuf::from(value);
        }
        if let Some(value) = non_empty(ENV_PATCH_STAGING) {
            config.patch_staging = PathBuf::from(value);
        }
        if let Some(value) = non_empty(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(value));
        }
        config
    }

    /// Filesystem layout handed to the orchestrator.
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout {
            source_root: self.source_root.clone(),
            patch_staging: self.patch_staging.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}
