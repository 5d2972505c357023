//! RPC response types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// RPC response envelope.
///
/// The worker emits a single JSON response line on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version echoed from the request.
    pub protocol_version: i32,
    /// Request ID echoed from the request.
    pub request_id: String,
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Success payload (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error details (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(protocol_version: i32, request_id: String, payload: serde_json::Value) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(protocol_version: i32, request_id: String, error: RpcError) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Convert into the typed payload, or the remote error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        if !self.ok {
            return Err(self
                .error
                .unwrap_or_else(|| RpcError::internal("error response without error body")));
        }
        let payload = self.payload.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(payload)
            .map_err(|e| RpcError::invalid_request(format!("unexpected response payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ops::ListArtifactsResponse;

    #[test]
    fn test_into_result_success() {
        let response = RpcResponse::success(
            1,
            "req-1".to_string(),
            serde_json::json!({ "artifacts": [{ "name": "boot.img", "size_bytes": 10 }] }),
        );
        let listing: ListArtifactsResponse = response.into_result().unwrap();
        assert_eq!(listing.artifacts.len(), 1);
        assert_eq!(listing.artifacts[0].name, "boot.img");
    }

    #[test]
    fn test_into_result_error() {
        let response = RpcResponse::error(
            1,
            "req-2".to_string(),
            RpcError::unknown_operation("bogus"),
        );
        let err = response.into_result::<ListArtifactsResponse>().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownOperation);
    }

    #[test]
    fn test_error_body_omits_payload() {
        let response = RpcResponse::error(1, "req-3".to_string(), RpcError::internal("boom"));
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("\"payload\""));
        assert!(json.contains("INTERNAL"));
    }
}
