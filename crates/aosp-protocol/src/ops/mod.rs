//! Operation-specific types.

pub mod artifacts;
pub mod build;

pub use artifacts::{ArtifactEntry, ListArtifactsRequest, ListArtifactsResponse, BYTES_PER_MB};
pub use build::{
    BuildOutcome, EncodedBundle, FullBuildRequest, FullBuildResponse, OverlayPayload, Phase,
    PhaseRecord, PhaseStatus, ResourceProfile, SourceSpec, DEFAULT_TARGET,
};
pub use build::is_valid_target;

/// Known operation names.
pub mod names {
    pub const LIST_ARTIFACTS: &str = "list_artifacts";
    pub const FULL_BUILD: &str = "full_build";
}
