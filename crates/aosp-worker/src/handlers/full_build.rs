//! Full build operation handler.
//!
//! Decodes and verifies the overlay bundles, takes the source lock, then runs
//! the orchestrator to completion. Build failures come back as a successful
//! RPC carrying the failed outcome; only malformed input, a busy source tree
//! and local I/O trouble are RPC errors.

use aosp_bundle::BundleError;
use aosp_protocol::ops::{is_valid_target, FullBuildRequest};
use aosp_protocol::{RpcError, RpcRequest};

use crate::config::WorkerConfig;
use crate::lock::{LockError, SourceLock};
use crate::orchestrator::{BuildInputs, Orchestrator};
use crate::store::ArtifactStore;
use crate::tools::Tooling;

use super::to_payload;

/// Handle the full_build operation.
pub fn handle(
    request: &RpcRequest,
    config: &WorkerConfig,
    tools: &Tooling,
) -> Result<serde_json::Value, RpcError> {
    let req: FullBuildRequest = request.parse_payload()?;
    if !is_valid_target(&req.target) {
        return Err(RpcError::invalid_request(format!(
            "invalid build target {:?}",
            req.target
        )));
    }

    tracing::info!(
        build_target = %req.target,
        overlays = req.overlays.present_count(),
        jobs = req.effective_build_jobs(),
        "starting full build"
    );

    let inputs = BuildInputs::from_request(&req).map_err(bundle_error)?;

    let _lock = SourceLock::try_acquire(&config.source_root).map_err(|e| match e {
        LockError::Held(_) => RpcError::busy(format!("{}, try again later", e)),
        LockError::Io(e) => RpcError::internal(format!("failed to lock source tree: {}", e)),
    })?;

    let store = ArtifactStore::open(&config.artifacts_root)
        .map_err(|e| RpcError::internal(format!("failed to open artifact store: {}", e)))?;
    let layout = config.layout();

    let report = Orchestrator::new(&layout, &store, tools)
        .run_full_build(&inputs)
        .map_err(|e| RpcError::internal(format!("full build aborted: {}", e)))?;

    to_payload(&report.into_response())
}

fn bundle_error(err: BundleError) -> RpcError {
    match err {
        BundleError::DigestMismatch {
            origin,
            expected,
            actual,
        } => RpcError::integrity_mismatch(&origin, &expected, &actual),
        other => RpcError::invalid_request(format!("invalid overlay bundle: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{tooling, FakeDriver, FakeFetcher, FakePatcher};
    use aosp_protocol::ops::{
        names, BuildOutcome, EncodedBundle, FullBuildResponse, OverlayPayload, ResourceProfile,
        SourceSpec, DEFAULT_TARGET,
    };
    use aosp_protocol::ErrorCode;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> WorkerConfig {
        WorkerConfig {
            source_root: dir.path().join("aosp"),
            artifacts_root: dir.path().join("artifacts"),
            patch_staging: dir.path().join("patches"),
            ..WorkerConfig::default()
        }
    }

    fn request(overlays: OverlayPayload) -> RpcRequest {
        let payload = FullBuildRequest {
            target: DEFAULT_TARGET.to_string(),
            source: SourceSpec::default(),
            build_jobs: 4,
            resources: ResourceProfile::full_build(),
            overlays,
        };
        RpcRequest::new(1, names::FULL_BUILD, "req-build", &payload).unwrap()
    }

    #[test]
    fn test_build_failure_is_a_successful_rpc() {
        let dir = TempDir::new().unwrap();
        let tools = tooling(
            &FakeFetcher::succeeding(),
            &FakeDriver::exiting(2),
            &FakePatcher::new(),
        );

        let value = handle(&request(OverlayPayload::default()), &config(&dir), &tools).unwrap();
        let response: FullBuildResponse = serde_json::from_value(value).unwrap();

        assert_eq!(response.outcome, BuildOutcome::BuildFailure { code: 2 });
        assert_eq!(response.message, "Build failed with code 2");
    }

    #[test]
    fn test_tampered_bundle_is_integrity_mismatch() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::exiting(0);
        let tools = tooling(&FakeFetcher::succeeding(), &driver, &FakePatcher::new());
        let overlays = OverlayPayload {
            aidl: Some(EncodedBundle {
                origin: "/home/dev/aidl".to_string(),
                root_name: "aidl".to_string(),
                data_b64: "aGVsbG8=".to_string(),
                sha256: "ff".repeat(32),
            }),
            ..OverlayPayload::default()
        };

        let err = handle(&request(overlays), &config(&dir), &tools).unwrap_err();

        assert_eq!(err.code, ErrorCode::IntegrityMismatch);
        assert!(driver.invocations().is_empty());
    }

    #[test]
    fn test_unsafe_target_is_rejected_before_building() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::exiting(0);
        let tools = tooling(&FakeFetcher::succeeding(), &driver, &FakePatcher::new());
        let mut req = request(OverlayPayload::default());
        req.payload["target"] = serde_json::json!("agi_os_x86_64-eng; touch INJECTED");

        let err = handle(&req, &config(&dir), &tools).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(driver.invocations().is_empty());
    }

    #[test]
    fn test_second_build_is_busy_while_one_runs() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let fetcher = FakeFetcher::succeeding();
        let tools = tooling(&fetcher, &FakeDriver::exiting(0), &FakePatcher::new());

        let _running = SourceLock::try_acquire(&config.source_root).unwrap();
        let err = handle(&request(OverlayPayload::default()), &config, &tools).unwrap_err();

        assert_eq!(err.code, ErrorCode::Busy);
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn test_lock_released_after_build() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let tools = tooling(
            &FakeFetcher::succeeding(),
            &FakeDriver::exiting(2),
            &FakePatcher::new(),
        );

        handle(&request(OverlayPayload::default()), &config, &tools).unwrap();
        assert!(SourceLock::try_acquire(&config.source_root).is_ok());
    }

    #[test]
    fn test_malformed_payload_is_invalid_request() {
        let dir = TempDir::new().unwrap();
        let tools = tooling(
            &FakeFetcher::succeeding(),
            &FakeDriver::exiting(0),
            &FakePatcher::new(),
        );
        let mut req = request(OverlayPayload::default());
        req.payload = serde_json::json!({ "target": 7 });

        let err = handle(&req, &config(&dir), &tools).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }
}
