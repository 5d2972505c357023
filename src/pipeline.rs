//! Action pipeline
//!
//! Runs one CLI action end to end:
//! - `status`: list the artifact store
//! - `fullbuild`: package local components, run the remote build, print
//!   its terminal message
//! - `download`: list the store with retrieval guidance
//!
//! Host-side failures map to process exit codes through
//! [`PipelineError::exit_code`].

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use aosp_bundle::BundleError;
use aosp_protocol::ops::{ArtifactEntry, FullBuildResponse, ResourceProfile};
use thiserror::Error;

use crate::config::{ConfigError, Settings};
use crate::host::{BuilderClient, ClientError, Transport};
use crate::inputs::{build_request, LocalInputs};
use crate::report;

/// Expected duration, printed before a full build starts.
const FULL_BUILD_BANNER: &str = "This will take 6-8 hours (sync: ~2h, build: ~4-6h)";

/// CLI action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Status,
    FullBuild,
    Download,
}

impl Action {
    /// Parse an `--action` value; None for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(Action::Status),
            "fullbuild" => Some(Action::FullBuild),
            "download" => Some(Action::Download),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Status => "status",
            Action::FullBuild => "fullbuild",
            Action::Download => "download",
        }
    }

    /// Remote resources the action is provisioned with.
    pub fn profile(&self) -> ResourceProfile {
        match self {
            Action::Status => ResourceProfile::status(),
            Action::FullBuild => ResourceProfile::full_build(),
            Action::Download => ResourceProfile::download(),
        }
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bundling error: {0}")]
    Bundling(#[from] BundleError),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Bundling(_) => 92,
            PipelineError::Client(e) => e.exit_code(),
            PipelineError::Io(_) => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// What an action produced, beyond the text it printed.
#[derive(Debug, Clone)]
pub enum ActionReport {
    Listing(Vec<ArtifactEntry>),
    Build(FullBuildResponse),
}

/// Run `action`, writing user-facing text to `out`.
pub fn run_action(
    action: Action,
    settings: &Settings,
    base_dir: &Path,
    transport: Arc<dyn Transport>,
    out: &mut dyn Write,
) -> PipelineResult<ActionReport> {
    let client = BuilderClient::new(transport);
    tracing::debug!(action = action.as_str(), target_product = %settings.target, "running action");

    match action {
        Action::Status => {
            let listing = client.list_artifacts(&action.profile())?;
            writeln!(out, "{}", report::format_status(&listing.artifacts))?;
            Ok(ActionReport::Listing(listing.artifacts))
        }
        Action::Download => {
            let listing = client.list_artifacts(&action.profile())?;
            writeln!(
                out,
                "{}",
                report::format_download(&listing.artifacts, &settings.download.command)
            )?;
            Ok(ActionReport::Listing(listing.artifacts))
        }
        Action::FullBuild => {
            writeln!(out, "=== Packaging local components ===")?;
            let inputs = LocalInputs::resolve(&settings.paths, base_dir);
            let overlays = inputs.pack()?;
            tracing::info!("{} of 5 components packaged", overlays.present_count());

            writeln!(out, "\n=== Starting full build ===")?;
            writeln!(out, "{}", FULL_BUILD_BANNER)?;
            out.flush()?;

            let request = build_request(settings, overlays);
            let response = client.full_build(&request)?;

            for phase in &response.phases {
                tracing::debug!(
                    "{} {:?} in {:.1}s",
                    phase.phase,
                    phase.status,
                    phase.duration_ms as f64 / 1000.0
                );
            }
            if !response.output_tail.is_empty() {
                writeln!(out, "Last build output:")?;
                for line in &response.output_tail {
                    writeln!(out, "  {}", line)?;
                }
            }
            writeln!(out, "{}", response.message)?;
            Ok(ActionReport::Build(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(Action::parse("status"), Some(Action::Status));
        assert_eq!(Action::parse("fullbuild"), Some(Action::FullBuild));
        assert_eq!(Action::parse("download"), Some(Action::Download));
        assert_eq!(Action::parse("build"), None);
        assert_eq!(Action::parse("STATUS"), None);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(Action::Status.profile().timeout_seconds, 300);
        assert_eq!(Action::Download.profile().timeout_seconds, 600);
        assert_eq!(Action::FullBuild.profile().cpu, Some(32));
    }

    #[test]
    fn test_exit_codes() {
        let config = PipelineError::Config(ConfigError::ValidationError("x".to_string()));
        assert_eq!(config.exit_code(), 1);

        let timeout = PipelineError::Client(ClientError::Transport(
            crate::host::TransportError::Timeout {
                limit: std::time::Duration::from_secs(1),
            },
        ));
        assert_eq!(timeout.exit_code(), 80);
    }
}
