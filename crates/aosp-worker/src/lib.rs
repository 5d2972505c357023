//! AOSP Builder Worker
//!
//! The worker runs inside the remote execution environment. It reads a
//! single JSON RPC request from stdin and answers on stdout:
//!
//! - `list_artifacts`: enumerate the durable artifact store
//! - `full_build`: sync → overlay → compile → collect
//!
//! The external tools (source fetch, build driver, patch application) sit
//! behind traits in [`tools`] so the phase sequencing can run against the
//! fakes in [`fakes`].

pub mod config;
pub mod fakes;
pub mod handlers;
pub mod lock;
pub mod orchestrator;
pub mod process;
pub mod rpc;
pub mod store;
pub mod tools;

pub use config::WorkerConfig;
pub use lock::{LockError, SourceLock};
pub use orchestrator::{
    BuildInputs, BuildReport, Orchestrator, OrchestratorError, OverlaySet, WorkspaceLayout,
};
pub use process::{ProcessError, ProcessOutcome};
pub use rpc::RpcHandler;
pub use store::{ArtifactStore, StoreError};
pub use tools::{BuildDriver, BuildInvocation, PatchApplier, SourceFetcher, SyncOptions, Tooling};
