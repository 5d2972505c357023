//! User-facing text for `status` and `download`.

use aosp_protocol::ops::ArtifactEntry;

/// Printed when the store holds nothing.
pub const NO_ARTIFACTS: &str = "No artifacts found. Run --action fullbuild first.";

/// Printed for an unrecognized action.
pub const USAGE: &str = "Usage: aosp-builder --action [status|fullbuild|download]";

/// Artifact the retrieval hint names when it is present.
const PREFERRED_ARTIFACT: &str = "system.img";

/// Placeholder in the configured download command.
const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// Text for the `status` action.
pub fn format_status(artifacts: &[ArtifactEntry]) -> String {
    if artifacts.is_empty() {
        return NO_ARTIFACTS.to_string();
    }
    let lines: Vec<String> = artifacts
        .iter()
        .map(|a| format!("{}: {:.1} MB", a.name, a.size_mb()))
        .collect();
    format!("Build artifacts found:\n{}", lines.join("\n"))
}

/// Text for the `download` action, including retrieval guidance.
pub fn format_download(artifacts: &[ArtifactEntry], command_template: &str) -> String {
    let Some(command) = download_command(artifacts, command_template) else {
        return NO_ARTIFACTS.to_string();
    };

    let mut out = String::from("Available artifacts:\n");
    for a in artifacts {
        out.push_str(&format!("  {}: {:.1} MB\n", a.name, a.size_mb()));
    }
    out.push_str("\nTo download, use the volume CLI:\n");
    out.push_str(&format!("  {}", command));
    out
}

/// Retrieval command for the listing, or None when it is empty.
///
/// Names `system.img` when present, otherwise the first artifact.
pub fn download_command(artifacts: &[ArtifactEntry], command_template: &str) -> Option<String> {
    let artifact = artifacts
        .iter()
        .find(|a| a.name == PREFERRED_ARTIFACT)
        .or_else(|| artifacts.first())?;
    Some(command_template.replace(ARTIFACT_PLACEHOLDER, &artifact.name))
}
