//! AOSP Builder Protocol Types
//!
//! Defines the JSON RPC envelope for host↔worker communication and the
//! payloads exchanged by each operation.

pub mod error;
pub mod ops;
pub mod request;
pub mod response;

pub use error::{ErrorCode, RpcError};
pub use request::RpcRequest;
pub use response::RpcResponse;

/// Minimum protocol version supported by this implementation.
pub const PROTOCOL_MIN: i32 = 1;

/// Maximum protocol version supported by this implementation.
pub const PROTOCOL_MAX: i32 = 1;

/// Protocol version the host sends by default.
pub const PROTOCOL_CURRENT: i32 = PROTOCOL_MAX;
