//! List artifacts operation handler.
//!
//! Enumerates the durable artifact store. Used by both `status` and
//! `download` on the host.

use aosp_protocol::ops::{ListArtifactsRequest, ListArtifactsResponse};
use aosp_protocol::{RpcError, RpcRequest};

use crate::config::WorkerConfig;
use crate::store::ArtifactStore;

use super::to_payload;

/// Handle the list_artifacts operation.
pub fn handle(request: &RpcRequest, config: &WorkerConfig) -> Result<serde_json::Value, RpcError> {
    let _req: ListArtifactsRequest = request.parse_payload()?;

    let store = ArtifactStore::at(&config.artifacts_root);
    let artifacts = store
        .list()
        .map_err(|e| RpcError::internal(format!("failed to list artifacts: {}", e)))?;

    tracing::debug!(count = artifacts.len(), root = %config.artifacts_root.display(), "listed artifacts");
    to_payload(&ListArtifactsResponse { artifacts })
}
