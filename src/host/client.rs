//! Host RPC Client
//!
//! Typed calls over a [`Transport`]. Each call builds one request envelope,
//! bounds it by the invocation deadline of its resource profile and maps
//! the response back into payload types.

use std::sync::Arc;

use aosp_protocol::ops::{
    names, FullBuildRequest, FullBuildResponse, ListArtifactsRequest, ListArtifactsResponse,
    ResourceProfile,
};
use aosp_protocol::{RpcError, RpcRequest, PROTOCOL_CURRENT};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::transport::{Transport, TransportError};
use crate::timeout::InvocationDeadline;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Worker error: {0}")]
    Remote(RpcError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Response {got} does not match request {expected}")]
    MismatchedResponse { expected: String, got: String },
}

impl ClientError {
    /// Exit code for the binary (timeout 80, transport 20, remote 30).
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Transport(TransportError::Timeout { .. }) => 80,
            ClientError::Transport(_) => 20,
            ClientError::MismatchedResponse { .. } => 20,
            ClientError::Remote(_) => 30,
            ClientError::Serialization(_) => 30,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Host-side client for the builder worker.
pub struct BuilderClient {
    transport: Arc<dyn Transport>,
    protocol_version: i32,
}

impl BuilderClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            protocol_version: PROTOCOL_CURRENT,
        }
    }

    /// List the artifact store, bounded by `profile`.
    pub fn list_artifacts(&self, profile: &ResourceProfile) -> ClientResult<ListArtifactsResponse> {
        self.call(names::LIST_ARTIFACTS, &ListArtifactsRequest {}, profile)
    }

    /// Run sync, overlay, compile and collect on the worker.
    pub fn full_build(&self, request: &FullBuildRequest) -> ClientResult<FullBuildResponse> {
        self.call(names::FULL_BUILD, request, &request.resources)
    }

    fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        op: &str,
        payload: &P,
        profile: &ResourceProfile,
    ) -> ClientResult<R> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let request = RpcRequest::new(self.protocol_version, op, request_id.clone(), payload)?;
        let deadline = InvocationDeadline::for_profile(profile);

        tracing::debug!(
            op,
            request_id = %request_id,
            timeout_seconds = profile.timeout_seconds,
            "sending request"
        );
        let response = self.transport.execute(&request, &deadline)?;

        if response.request_id != request_id {
            return Err(ClientError::MismatchedResponse {
                expected: request_id,
                got: response.request_id,
            });
        }

        response.into_result().map_err(ClientError::Remote)
    }
}
