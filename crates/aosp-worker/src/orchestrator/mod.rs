//! Build orchestrator
//!
//! Drives one full build through SYNC → OVERLAY → COMPILE → COLLECT on a
//! single thread. Each phase lives in its own module; this one sequences
//! them through [`BuildMachine`] and turns the result into a
//! [`BuildReport`].
//!
//! Every expected way a build can end (sync failure, compile failure, no
//! output) is an `Ok` report. [`OrchestratorError`] is left for local I/O
//! failures nobody planned for.

pub mod collect;
pub mod compile;
pub mod overlay;
pub mod state;
pub mod sync;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use aosp_bundle::{BundleError, OverlayBlob};
use aosp_protocol::ops::{
    BuildOutcome, EncodedBundle, FullBuildRequest, FullBuildResponse, OverlayPayload, Phase,
    PhaseRecord, PhaseStatus, SourceSpec,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::process::report_disk_usage;
use crate::store::{ArtifactStore, StoreError};
use crate::tools::Tooling;

pub use state::{BuildMachine, BuildState, BuildStateError};
pub use sync::SyncOutcome;

/// File whose presence after SYNC means the tree can be built.
pub const SENTINEL: &str = "build/envsetup.sh";

/// Errors from the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Bundle error: {0}")]
    BundleError(#[from] BundleError),

    #[error("Artifact store error: {0}")]
    StoreError(#[from] StoreError),

    #[error(transparent)]
    StateError(#[from] BuildStateError),
}

/// Where the orchestrator works.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Source tree (ephemeral).
    pub source_root: PathBuf,
    /// Scratch directory the patch bundle is unpacked into.
    pub patch_staging: PathBuf,
    /// Full child-process logs, if enabled.
    pub log_dir: Option<PathBuf>,
}

/// The five overlay blobs of one build. Missing components are empty blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySet {
    pub device_config: OverlayBlob,
    pub system_service: OverlayBlob,
    pub sdk: OverlayBlob,
    pub aidl: OverlayBlob,
    pub patches: OverlayBlob,
}

impl Default for OverlaySet {
    fn default() -> Self {
        Self {
            device_config: OverlayBlob::empty(""),
            system_service: OverlayBlob::empty(""),
            sdk: OverlayBlob::empty(""),
            aidl: OverlayBlob::empty(""),
            patches: OverlayBlob::empty(""),
        }
    }
}

impl OverlaySet {
    /// Decode and verify every bundle of a request payload.
    pub fn from_payload(payload: &OverlayPayload) -> Result<Self, BundleError> {
        Ok(Self {
            device_config: decode(&payload.device_config)?,
            system_service: decode(&payload.system_service)?,
            sdk: decode(&payload.sdk)?,
            aidl: decode(&payload.aidl)?,
            patches: decode(&payload.patches)?,
        })
    }
}

fn decode(bundle: &Option<EncodedBundle>) -> Result<OverlayBlob, BundleError> {
    match bundle {
        None => Ok(OverlayBlob::empty("")),
        Some(b) => OverlayBlob::from_base64(&b.origin, &b.root_name, &b.data_b64, &b.sha256),
    }
}

/// Everything one full build needs besides the tools.
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub target: String,
    pub source: SourceSpec,
    /// Parallel compile jobs.
    pub build_jobs: u32,
    pub overlays: OverlaySet,
}

impl BuildInputs {
    pub fn from_request(request: &FullBuildRequest) -> Result<Self, BundleError> {
        Ok(Self {
            target: request.target.clone(),
            source: request.source.clone(),
            build_jobs: request.effective_build_jobs(),
            overlays: OverlaySet::from_payload(&request.overlays)?,
        })
    }
}

/// How a full build ended, with per-phase timings.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    pub phases: Vec<PhaseRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Last lines of the build driver output, when compile failed.
    pub output_tail: Vec<String>,
}

impl BuildReport {
    /// Whether `phase` ran at all.
    pub fn reached(&self, phase: Phase) -> bool {
        self.phases.iter().any(|p| p.phase == phase)
    }

    pub fn into_response(self) -> FullBuildResponse {
        FullBuildResponse {
            message: self.outcome.describe(),
            outcome: self.outcome,
            phases: self.phases,
            started_at: self.started_at,
            finished_at: self.finished_at,
            output_tail: self.output_tail,
        }
    }
}

/// Runs full builds against one layout, store and tool set.
pub struct Orchestrator<'a> {
    layout: &'a WorkspaceLayout,
    store: &'a ArtifactStore,
    tools: &'a Tooling,
}

impl<'a> Orchestrator<'a> {
    pub fn new(layout: &'a WorkspaceLayout, store: &'a ArtifactStore, tools: &'a Tooling) -> Self {
        Self {
            layout,
            store,
            tools,
        }
    }

    /// Run SYNC → OVERLAY → COMPILE → COLLECT, stopping at the first
    /// terminal failure.
    pub fn run_full_build(&self, inputs: &BuildInputs) -> Result<BuildReport, OrchestratorError> {
        let started_at = Utc::now();
        let mut machine = BuildMachine::new();
        let mut phases = Vec::new();
        let root = &self.layout.source_root;
        let log_dir = self.layout.log_dir.as_deref();

        fs::create_dir_all(root)?;
        report_disk_usage(log_dir);

        machine.transition(BuildState::Sync)?;
        let clock = Instant::now();
        match sync::sync_source(self.tools.fetcher.as_ref(), root, &inputs.source) {
            SyncOutcome::Ready { retried } => {
                let status = if retried {
                    PhaseStatus::Recovered
                } else {
                    PhaseStatus::Completed
                };
                record(&mut phases, Phase::Sync, status, clock, None);
                report_disk_usage(log_dir);
            }
            failed => {
                let detail = match failed {
                    SyncOutcome::InitFailed { code } => {
                        format!("repo init exited with code {}", code)
                    }
                    _ => format!("{} not found", SENTINEL),
                };
                record(&mut phases, Phase::Sync, PhaseStatus::Failed, clock, Some(detail));
                machine.transition(BuildState::SyncFailed)?;
                return Ok(finish(BuildOutcome::SyncFailure, phases, started_at, Vec::new()));
            }
        }

        machine.transition(BuildState::Overlay)?;
        let clock = Instant::now();
        let summary = overlay::apply_overlays(
            root,
            &self.layout.patch_staging,
            &inputs.overlays,
            self.tools.patcher.as_ref(),
        )?;
        let detail = format!(
            "{} unpacked, {} licenses fixed, {} patches applied, {} patches failed",
            summary.unpacked.len(),
            summary.licenses_fixed.len(),
            summary.patches_applied.len(),
            summary.patches_failed.len()
        );
        record(&mut phases, Phase::Overlay, PhaseStatus::Completed, clock, Some(detail));

        machine.transition(BuildState::Compile)?;
        let clock = Instant::now();
        let compiled = compile::compile(
            self.tools.driver.as_ref(),
            root,
            &inputs.target,
            inputs.build_jobs,
        );
        if !compiled.success() {
            report_disk_usage(log_dir);
            let detail = format!("exit code {}", compiled.code);
            record(&mut phases, Phase::Compile, PhaseStatus::Failed, clock, Some(detail));
            machine.transition(BuildState::BuildFailed)?;
            return Ok(finish(
                BuildOutcome::BuildFailure {
                    code: compiled.code,
                },
                phases,
                started_at,
                compiled.tail,
            ));
        }
        record(&mut phases, Phase::Compile, PhaseStatus::Completed, clock, None);

        machine.transition(BuildState::Collect)?;
        let clock = Instant::now();
        match collect::collect_artifacts(root, self.store)? {
            Some(artifacts) => {
                let detail = format!("{} artifacts copied", artifacts.len());
                record(&mut phases, Phase::Collect, PhaseStatus::Completed, clock, Some(detail));
                machine.transition(BuildState::Succeeded)?;
                Ok(finish(
                    BuildOutcome::Success { artifacts },
                    phases,
                    started_at,
                    Vec::new(),
                ))
            }
            None => {
                let detail = format!("no {} found", collect::PRIMARY_IMAGE);
                record(&mut phases, Phase::Collect, PhaseStatus::Failed, clock, Some(detail));
                machine.transition(BuildState::NoOutput)?;
                Ok(finish(BuildOutcome::NoOutputFound, phases, started_at, Vec::new()))
            }
        }
    }
}

fn record(
    phases: &mut Vec<PhaseRecord>,
    phase: Phase,
    status: PhaseStatus,
    clock: Instant,
    detail: Option<String>,
) {
    let duration_ms = clock.elapsed().as_millis() as u64;
    tracing::info!(%phase, ?status, duration_ms, "phase finished");
    phases.push(PhaseRecord {
        phase,
        status,
        duration_ms,
        detail,
    });
}

fn finish(
    outcome: BuildOutcome,
    phases: Vec<PhaseRecord>,
    started_at: DateTime<Utc>,
    output_tail: Vec<String>,
) -> BuildReport {
    tracing::info!("{}", outcome);
    BuildReport {
        outcome,
        phases,
        started_at,
        finished_at: Utc::now(),
        output_tail,
    }
}
