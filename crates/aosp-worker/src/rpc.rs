//! Worker RPC Handler
//!
//! Implements the stdin/stdout JSON RPC handler for the worker entrypoint,
//! invoked through the remote execution transport:
//!
//!   aosp-worker rpc
//!
//! The handler reads a single JSON request from stdin, dispatches to the
//! appropriate operation handler, and writes a single JSON response to
//! stdout. Progress goes to stderr through `tracing`.

use std::io::{self, BufRead, Write};

use aosp_protocol::{ops::names, RpcError, RpcRequest, RpcResponse};

use crate::config::WorkerConfig;
use crate::handlers;
use crate::tools::Tooling;

/// Protocol version echoed when the request could not be parsed at all.
const PROTOCOL_VERSION_UNKNOWN: i32 = 0;

/// Main RPC handler for the worker.
pub struct RpcHandler {
    config: WorkerConfig,
    tools: Tooling,
}

impl RpcHandler {
    /// Create a handler that drives the real `repo`, `bash` and `git`.
    pub fn new(config: WorkerConfig) -> Self {
        let tools = Tooling::system(config.log_dir.clone());
        Self::with_tooling(config, tools)
    }

    /// Create a handler with injected tools.
    pub fn with_tooling(config: WorkerConfig, tools: Tooling) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the RPC handler, reading from stdin and writing to stdout.
    pub fn run(&self) -> io::Result<()> {
        self.run_with_io(&mut io::stdin().lock(), &mut io::stdout().lock())
    }

    /// Run the RPC handler with custom I/O.
    pub fn run_with_io<R: BufRead, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> io::Result<()> {
        let response = self.handle_line(reader);
        self.write_response(writer, &response)
    }

    /// Read one request and produce its response.
    fn handle_line<R: BufRead>(&self, reader: &mut R) -> RpcResponse {
        let request = match self.read_request(reader) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("rejecting request: {}", e);
                return RpcResponse::error(PROTOCOL_VERSION_UNKNOWN, String::new(), e);
            }
        };

        if let Err(e) = self.validate_protocol_version(&request) {
            tracing::warn!(request_id = %request.request_id, "rejecting request: {}", e);
            return RpcResponse::error(request.protocol_version, request.request_id.clone(), e);
        }

        self.dispatch(&request)
    }

    /// Read and parse the RPC request from the reader.
    fn read_request<R: BufRead>(&self, reader: &mut R) -> Result<RpcRequest, RpcError> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| RpcError::invalid_request(format!("failed to read request: {}", e)))?;

        serde_json::from_str(&line)
            .map_err(|e| RpcError::invalid_request(format!("invalid JSON: {}", e)))
    }

    /// Validate the protocol version in the request.
    fn validate_protocol_version(&self, request: &RpcRequest) -> Result<(), RpcError> {
        if request.protocol_version < self.config.protocol_min
            || request.protocol_version > self.config.protocol_max
        {
            return Err(RpcError::unsupported_protocol(
                request.protocol_version,
                self.config.protocol_min,
                self.config.protocol_max,
            ));
        }
        Ok(())
    }

    /// Dispatch the request to the appropriate operation handler.
    fn dispatch(&self, request: &RpcRequest) -> RpcResponse {
        tracing::debug!(op = %request.op, request_id = %request.request_id, "dispatching");

        let result = match request.op.as_str() {
            names::LIST_ARTIFACTS => handlers::list_artifacts::handle(request, &self.config),
            names::FULL_BUILD => handlers::full_build::handle(request, &self.config, &self.tools),
            _ => Err(RpcError::unknown_operation(&request.op)),
        };

        match result {
            Ok(payload) => {
                RpcResponse::success(request.protocol_version, request.request_id.clone(), payload)
            }
            Err(e) => {
                tracing::error!(op = %request.op, "{}", e);
                RpcResponse::error(request.protocol_version, request.request_id.clone(), e)
            }
        }
    }

    /// Write the response to the writer.
    fn write_response<W: Write>(&self, writer: &mut W, response: &RpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{tooling, FakeDriver, FakeFetcher, FakePatcher};
    use aosp_protocol::ops::ListArtifactsResponse;
    use aosp_protocol::ErrorCode;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_handler(dir: &TempDir) -> RpcHandler {
        let config = WorkerConfig {
            source_root: dir.path().join("aosp"),
            artifacts_root: dir.path().join("artifacts"),
            patch_staging: dir.path().join("patches"),
            ..WorkerConfig::default()
        };
        let tools = tooling(
            &FakeFetcher::succeeding(),
            &FakeDriver::exiting(0),
            &FakePatcher::new(),
        );
        RpcHandler::with_tooling(config, tools)
    }

    fn roundtrip(handler: &RpcHandler, input: &str) -> RpcResponse {
        let mut reader = Cursor::new(input);
        let mut output = Vec::new();
        handler.run_with_io(&mut reader, &mut output).unwrap();

        let output_str = String::from_utf8(output).unwrap();
        assert_eq!(output_str.lines().count(), 1);
        serde_json::from_str(&output_str).unwrap()
    }

    #[test]
    fn test_list_artifacts_request() {
        let dir = TempDir::new().unwrap();
        let handler = create_handler(&dir);

        let response = roundtrip(
            &handler,
            "{\"protocol_version\":1,\"op\":\"list_artifacts\",\"request_id\":\"test-001\",\"payload\":{}}\n",
        );

        assert!(response.ok);
        assert_eq!(response.request_id, "test-001");
        let listing: ListArtifactsResponse = response.into_result().unwrap();
        assert!(listing.artifacts.is_empty());
    }

    #[test]
    fn test_unsupported_protocol_version() {
        let dir = TempDir::new().unwrap();
        let handler = create_handler(&dir);

        let response = roundtrip(
            &handler,
            "{\"protocol_version\":9,\"op\":\"list_artifacts\",\"request_id\":\"test-002\",\"payload\":{}}\n",
        );

        assert!(!response.ok);
        assert_eq!(response.protocol_version, 9);
        assert_eq!(
            response.error.as_ref().unwrap().code,
            ErrorCode::UnsupportedProtocol
        );
    }

    #[test]
    fn test_invalid_json() {
        let dir = TempDir::new().unwrap();
        let handler = create_handler(&dir);

        let response = roundtrip(&handler, "not valid json\n");

        assert!(!response.ok);
        assert_eq!(response.protocol_version, 0);
        assert_eq!(response.error.as_ref().unwrap().code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_unknown_operation() {
        let dir = TempDir::new().unwrap();
        let handler = create_handler(&dir);

        let response = roundtrip(
            &handler,
            "{\"protocol_version\":1,\"op\":\"reboot\",\"request_id\":\"test-004\",\"payload\":{}}\n",
        );

        assert!(!response.ok);
        assert_eq!(response.error.as_ref().unwrap().code, ErrorCode::UnknownOperation);
    }
}
