//! Typed view of the merged configuration

use aosp_protocol::ops::{is_valid_target, SourceSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::effective::ConfigError;

/// Upper bound on the transport connect timeout.
const MAX_CONNECT_TIMEOUT_SECONDS: u64 = 300;

/// Everything the host needs for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub target: String,
    pub build_jobs: u32,
    pub source: SourceSpec,
    pub paths: PathSettings,
    pub transport: TransportSettings,
    pub download: DownloadSettings,
}

/// Local component directories. Relative paths resolve against the base dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    pub device_config: PathBuf,
    pub system_service: PathBuf,
    pub sdk: PathBuf,
    pub aidl: PathBuf,
    pub patches: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ssh,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    pub kind: TransportKind,

    /// Build host (required for ssh)
    #[serde(default)]
    pub host: Option<String>,

    pub user: String,
    pub port: u16,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    pub connect_timeout_seconds: u64,

    /// Command run on the build host
    pub worker_command: String,

    /// Worker binary for the local transport
    pub worker_binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Retrieval command; `{artifact}` is replaced by an artifact name
    pub command: String,
}

impl Settings {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "target must not be empty".to_string(),
            ));
        }
        if !is_valid_target(&self.target) {
            return Err(ConfigError::ValidationError(format!(
                "target {:?} may only contain letters, digits, '_', '.' and '-'",
                self.target
            )));
        }

        let timeout = self.transport.connect_timeout_seconds;
        if timeout == 0 || timeout > MAX_CONNECT_TIMEOUT_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "transport.connect_timeout_seconds must be in 1..={}, got {}",
                MAX_CONNECT_TIMEOUT_SECONDS, timeout
            )));
        }

        if self.transport.kind == TransportKind::Ssh
            && self.transport.host.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::ValidationError(
                "transport.host is required for the ssh transport".to_string(),
            ));
        }

        if self.source.sync_jobs == 0 || self.source.retry_jobs == 0 {
            return Err(ConfigError::ValidationError(
                "source.sync_jobs and source.retry_jobs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
