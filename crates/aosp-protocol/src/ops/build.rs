//! Full-build operation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifacts::ArtifactEntry;

/// Product/variant compiled when the caller does not choose one.
pub const DEFAULT_TARGET: &str = "agi_os_x86_64-eng";

/// Compute resources requested from the remote execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// CPU count, if the invocation needs more than the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Ephemeral disk in GB (source tree and build output live here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_disk_gb: Option<u32>,
    /// Overall invocation timeout in seconds.
    pub timeout_seconds: u64,
}

impl ResourceProfile {
    /// Profile for the read-only `status` query.
    pub fn status() -> Self {
        Self {
            cpu: None,
            memory_mb: 4096,
            ephemeral_disk_gb: None,
            timeout_seconds: 300,
        }
    }

    /// Profile for the `download` listing.
    pub fn download() -> Self {
        Self {
            cpu: None,
            memory_mb: 4096,
            ephemeral_disk_gb: None,
            timeout_seconds: 600,
        }
    }

    /// Profile for a full sync + compile (12 hours, 32 CPUs, 550 GB disk).
    pub fn full_build() -> Self {
        Self {
            cpu: Some(32),
            memory_mb: 65536,
            ephemeral_disk_gb: Some(550),
            timeout_seconds: 43200,
        }
    }
}

/// Where and how the external source tree is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Manifest repository URL.
    pub manifest_url: String,
    /// Pinned manifest branch/revision.
    pub branch: String,
    /// Clone depth (1 = shallow).
    pub depth: u32,
    /// Parallel fetch jobs for the first sync attempt.
    pub sync_jobs: u32,
    /// Parallel fetch jobs for the single forced retry.
    pub retry_jobs: u32,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            manifest_url: "https://android.googlesource.com/platform/manifest".to_string(),
            branch: "android-13.0.0_r83".to_string(),
            depth: 1,
            sync_jobs: 16,
            retry_jobs: 4,
        }
    }
}

/// Transport form of an overlay bundle: base64 gzip tar plus digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBundle {
    /// Local path the bundle was packed from (for log messages).
    pub origin: String,
    /// Base name the archive is rooted at.
    pub root_name: String,
    /// Base64 of the compressed archive.
    pub data_b64: String,
    /// SHA-256 hex digest of the compressed archive bytes.
    pub sha256: String,
}

/// All overlay bundles of one invocation. Absent means "no overlay".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_config: Option<EncodedBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_service: Option<EncodedBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<EncodedBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aidl: Option<EncodedBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches: Option<EncodedBundle>,
}

impl OverlayPayload {
    /// Number of bundles actually carried.
    pub fn present_count(&self) -> usize {
        [
            &self.device_config,
            &self.system_service,
            &self.sdk,
            &self.aidl,
            &self.patches,
        ]
        .iter()
        .filter(|b| b.is_some())
        .count()
    }
}

/// Request payload for `full_build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullBuildRequest {
    /// Product/variant passed to `lunch`.
    #[serde(default = "default_target")]
    pub target: String,
    /// Source tree to sync.
    #[serde(default)]
    pub source: SourceSpec,
    /// Parallel compile jobs (`m -jN`). Zero means "use the CPU count".
    #[serde(default)]
    pub build_jobs: u32,
    /// Resources this invocation was provisioned with.
    pub resources: ResourceProfile,
    /// Local components to apply on top of the synced tree.
    #[serde(default)]
    pub overlays: OverlayPayload,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

/// Whether `target` is a plausible `lunch` product/variant: ASCII letters,
/// digits, `_`, `.` and `-`, not starting with `-`.
pub fn is_valid_target(target: &str) -> bool {
    !target.is_empty()
        && !target.starts_with('-')
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl FullBuildRequest {
    /// Compile job count after applying the CPU fallback.
    pub fn effective_build_jobs(&self) -> u32 {
        if self.build_jobs > 0 {
            self.build_jobs
        } else {
            self.resources.cpu.unwrap_or(1).max(1)
        }
    }
}

/// Terminal outcome of a full build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Primary image found and allow-listed artifacts committed.
    Success { artifacts: Vec<ArtifactEntry> },
    /// The sentinel file was missing after the sync retry.
    SyncFailure,
    /// The build driver exited non-zero.
    BuildFailure { code: i32 },
    /// The build driver reported success but no primary image exists.
    NoOutputFound,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success { .. })
    }

    /// The single user-facing line for this outcome.
    pub fn describe(&self) -> String {
        match self {
            BuildOutcome::Success { .. } => "Build complete! Artifacts saved.".to_string(),
            BuildOutcome::SyncFailure => {
                "ERROR: AOSP sync failed - build/envsetup.sh not found".to_string()
            }
            BuildOutcome::BuildFailure { code } => format!("Build failed with code {}", code),
            BuildOutcome::NoOutputFound => "Build completed but no output found".to_string(),
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// The four orchestrator phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Sync,
    Overlay,
    Compile,
    Collect,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Sync => write!(f, "SYNC"),
            Phase::Overlay => write!(f, "OVERLAY"),
            Phase::Compile => write!(f, "COMPILE"),
            Phase::Collect => write!(f, "COLLECT"),
        }
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    /// Completed only after the bounded retry.
    Recovered,
    Failed,
}

/// Timing and status of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Response payload for `full_build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullBuildResponse {
    pub outcome: BuildOutcome,
    /// `outcome.describe()`, precomputed for the host.
    pub message: String,
    /// Phases that ran, in order.
    pub phases: Vec<PhaseRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Last lines of the build driver's output when compile failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_tail: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_descriptions() {
        assert_eq!(
            BuildOutcome::Success { artifacts: vec![] }.describe(),
            "Build complete! Artifacts saved."
        );
        assert_eq!(
            BuildOutcome::SyncFailure.describe(),
            "ERROR: AOSP sync failed - build/envsetup.sh not found"
        );
        assert_eq!(
            BuildOutcome::BuildFailure { code: 2 }.describe(),
            "Build failed with code 2"
        );
        assert_eq!(
            BuildOutcome::NoOutputFound.describe(),
            "Build completed but no output found"
        );
    }

    #[test]
    fn test_outcome_tagged_serialization() {
        let json = serde_json::to_value(BuildOutcome::BuildFailure { code: 137 }).unwrap();
        assert_eq!(json["kind"], "build_failure");
        assert_eq!(json["code"], 137);
    }

    #[test]
    fn test_request_defaults() {
        let request: FullBuildRequest = serde_json::from_value(serde_json::json!({
            "resources": { "memory_mb": 65536, "timeout_seconds": 43200, "cpu": 32 }
        }))
        .unwrap();

        assert_eq!(request.target, DEFAULT_TARGET);
        assert_eq!(request.source.sync_jobs, 16);
        assert_eq!(request.source.retry_jobs, 4);
        assert_eq!(request.overlays.present_count(), 0);
        assert_eq!(request.effective_build_jobs(), 32);
    }

    #[test]
    fn test_explicit_build_jobs_win() {
        let request = FullBuildRequest {
            target: DEFAULT_TARGET.to_string(),
            source: SourceSpec::default(),
            build_jobs: 8,
            resources: ResourceProfile::full_build(),
            overlays: OverlayPayload::default(),
        };
        assert_eq!(request.effective_build_jobs(), 8);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(ResourceProfile::status().timeout_seconds, 300);
        assert_eq!(ResourceProfile::download().timeout_seconds, 600);
        let full = ResourceProfile::full_build();
        assert_eq!(full.cpu, Some(32));
        assert_eq!(full.ephemeral_disk_gb, Some(550));
    }

    #[test]
    fn test_target_validation() {
        assert!(is_valid_target(DEFAULT_TARGET));
        assert!(is_valid_target("aosp_cf_x86_64_phone-trunk_staging-userdebug"));
        assert!(!is_valid_target(""));
        assert!(!is_valid_target("-eng"));
        assert!(!is_valid_target("agi_os_x86_64-eng; touch INJECTED"));
        assert!(!is_valid_target("agi os"));
        assert!(!is_valid_target("$(reboot)"));
    }
}
