//! Operation handlers for the worker RPC.
//!
//! Each operation has its own handler module that parses the payload,
//! does the work and returns the response payload.

pub mod full_build;
pub mod list_artifacts;

use aosp_protocol::RpcError;
use serde::Serialize;

/// Serialize a response payload.
pub(crate) fn to_payload<T: Serialize>(response: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(response)
        .map_err(|e| RpcError::internal(format!("failed to serialize response: {}", e)))
}
