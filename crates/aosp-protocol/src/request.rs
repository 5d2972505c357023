//! RPC request types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// RPC request envelope.
///
/// The worker accepts a single JSON request line on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version selected by the host.
    pub protocol_version: i32,
    /// Operation name.
    pub op: String,
    /// Caller-chosen request ID for correlation.
    pub request_id: String,
    /// Operation-specific payload.
    pub payload: serde_json::Value,
}

impl RpcRequest {
    /// Build a request for `op` with a typed payload.
    pub fn new<P: Serialize>(
        protocol_version: i32,
        op: &str,
        request_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            protocol_version,
            op: op.to_string(),
            request_id: request_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload into the operation's request type.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            RpcError::invalid_request(format!("invalid {} request: {}", self.op, e))
        })
    }
}
