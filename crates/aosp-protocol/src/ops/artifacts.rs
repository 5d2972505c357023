//! Artifact listing types shared by the `status` and `download` commands.

use serde::{Deserialize, Serialize};

/// Divisor used for every human-facing size figure.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A committed file in the durable artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// File name directly under the store root.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl ArtifactEntry {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }

    /// Size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// Request payload for `list_artifacts`. Carries nothing today.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListArtifactsRequest {}

/// Response payload for `list_artifacts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListArtifactsResponse {
    /// Entries ordered by name. Empty when nothing has been committed yet.
    pub artifacts: Vec<ArtifactEntry>,
}
