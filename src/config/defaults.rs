//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use aosp_protocol::ops::{SourceSpec, DEFAULT_TARGET};
use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Product/variant to build
    pub target: String,

    /// Parallel compile jobs (0 = remote CPU count)
    pub build_jobs: u32,

    /// Source tree to sync
    pub source: SourceSpec,

    /// How to reach the worker: "ssh" or "local"
    pub transport_kind: String,

    /// SSH user on the build host
    pub ssh_user: String,

    /// SSH port
    pub ssh_port: u16,

    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_seconds: u64,

    /// Command run on the remote side
    pub worker_command: String,

    /// Worker binary for the local transport
    pub worker_binary: String,

    /// Retrieval command shown by `download`; `{artifact}` is substituted
    pub download_command: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            build_jobs: 0,
            source: SourceSpec::default(),
            transport_kind: "ssh".to_string(),
            ssh_user: "aosp".to_string(),
            ssh_port: 22,
            connect_timeout_seconds: 30,
            worker_command: "aosp-worker rpc".to_string(),
            worker_binary: "aosp-worker".to_string(),
            download_command: "modal volume get agi-os-artifacts {artifact} ./".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "target": self.target,
            "build_jobs": self.build_jobs,
            "source": self.source,
            "paths": {
                "device_config": "aosp/device/agi",
                "system_service": "system-service",
                "sdk": "sdk",
                "aidl": "aidl",
                "patches": "aosp/patches"
            },
            "transport": {
                "kind": self.transport_kind,
                "user": self.ssh_user,
                "port": self.ssh_port,
                "connect_timeout_seconds": self.connect_timeout_seconds,
                "worker_command": self.worker_command,
                "worker_binary": self.worker_binary
            },
            "download": {
                "command": self.download_command
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.target, "agi_os_x86_64-eng");
        assert_eq!(defaults.build_jobs, 0);
        assert_eq!(defaults.transport_kind, "ssh");
        assert_eq!(defaults.connect_timeout_seconds, 30);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["paths"]["device_config"], "aosp/device/agi");
        assert_eq!(value["paths"]["patches"], "aosp/patches");
        assert_eq!(value["source"]["branch"], "android-13.0.0_r83");
        assert_eq!(value["transport"]["worker_command"], "aosp-worker rpc");
    }
}
