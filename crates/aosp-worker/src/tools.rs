//! External tool seams.
//!
//! The orchestrator never spawns processes itself: it talks to a
//! [`SourceFetcher`], a [`BuildDriver`] and a [`PatchApplier`]. The real
//! implementations here shell out to `repo`, `bash` and `git`; tests use the
//! fakes in [`crate::fakes`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use aosp_protocol::ops::SourceSpec;

use crate::process::{run_streaming, ProcessError, ProcessOutcome};

/// Parameters of one `repo sync` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Parallel fetch jobs.
    pub jobs: u32,
    /// Overwrite diverged local state (`--force-sync`).
    pub force: bool,
}

/// Everything the build driver needs to compile one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    /// Product/variant handed to `lunch`.
    pub target: String,
    /// Parallel compile jobs.
    pub jobs: u32,
    /// Environment overrides for the build.
    pub env: BTreeMap<String, String>,
    /// `NAME=value` arguments passed to `m`.
    pub make_vars: BTreeMap<String, String>,
}

/// Initializes and synchronizes the source tree.
pub trait SourceFetcher: Send + Sync {
    /// Point the checkout at the manifest. Returns the exit code.
    fn init(&self, root: &Path, spec: &SourceSpec) -> Result<i32, ProcessError>;

    /// Fetch the tree. Returns the exit code.
    fn sync(&self, root: &Path, options: SyncOptions) -> Result<i32, ProcessError>;
}

/// Runs the product build.
pub trait BuildDriver: Send + Sync {
    fn build(&self, root: &Path, invocation: &BuildInvocation)
        -> Result<ProcessOutcome, ProcessError>;
}

/// Applies a single patch file inside a repository.
pub trait PatchApplier: Send + Sync {
    /// Returns the exit code.
    fn apply(&self, repo_dir: &Path, patch: &Path) -> Result<i32, ProcessError>;
}

/// The set of tools one orchestrator run uses.
pub struct Tooling {
    pub fetcher: Box<dyn SourceFetcher>,
    pub driver: Box<dyn BuildDriver>,
    pub patcher: Box<dyn PatchApplier>,
}

impl Tooling {
    /// The real tools, logging to `log_dir` when set.
    pub fn system(log_dir: Option<PathBuf>) -> Self {
        Self {
            fetcher: Box::new(RepoTool::new(log_dir.clone())),
            driver: Box::new(LunchDriver::new(log_dir.clone())),
            patcher: Box::new(GitApply::new(log_dir)),
        }
    }
}

/// `repo` command-line tool.
#[derive(Debug, Clone)]
pub struct RepoTool {
    program: String,
    log_dir: Option<PathBuf>,
}

impl RepoTool {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self {
            program: "repo".to_string(),
            log_dir,
        }
    }

    /// Arguments of `repo init`.
    pub fn init_args(spec: &SourceSpec) -> Vec<String> {
        vec![
            "init".to_string(),
            "-u".to_string(),
            spec.manifest_url.clone(),
            "-b".to_string(),
            spec.branch.clone(),
            format!("--depth={}", spec.depth),
        ]
    }

    /// Arguments of `repo sync`. A forced sync trades the fetch
    /// optimizations for `--force-sync`.
    pub fn sync_args(options: SyncOptions) -> Vec<String> {
        let mut args = vec![
            "sync".to_string(),
            format!("-j{}", options.jobs),
            "-c".to_string(),
            "--no-tags".to_string(),
        ];
        if options.force {
            args.push("--force-sync".to_string());
        } else {
            args.push("--no-clone-bundle".to_string());
            args.push("--optimized-fetch".to_string());
        }
        args
    }
}

impl SourceFetcher for RepoTool {
    fn init(&self, root: &Path, spec: &SourceSpec) -> Result<i32, ProcessError> {
        let mut command = Command::new(&self.program);
        command.args(Self::init_args(spec)).current_dir(root);
        Ok(run_streaming(&mut command, "repo-init", self.log_dir.as_deref())?.code)
    }

    fn sync(&self, root: &Path, options: SyncOptions) -> Result<i32, ProcessError> {
        let mut command = Command::new(&self.program);
        command.args(Self::sync_args(options)).current_dir(root);
        Ok(run_streaming(&mut command, "repo-sync", self.log_dir.as_deref())?.code)
    }
}

/// `envsetup.sh` + `lunch` + `m`, driven through bash.
#[derive(Debug, Clone, Default)]
pub struct LunchDriver {
    log_dir: Option<PathBuf>,
}

impl LunchDriver {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }

    /// The bash script run from the source root. The target is not part of
    /// the script; it arrives as `$1`.
    pub fn script(invocation: &BuildInvocation) -> String {
        let mut make = format!("m -j{}", invocation.jobs);
        for (name, value) in &invocation.make_vars {
            make.push_str(&format!(" {}={}", name, value));
        }
        format!("set -e\nsource build/envsetup.sh\nlunch \"$1\"\n{}\n", make)
    }
}

impl BuildDriver for LunchDriver {
    fn build(
        &self,
        root: &Path,
        invocation: &BuildInvocation,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(Self::script(invocation))
            .arg("bash")
            .arg(&invocation.target)
            .current_dir(root)
            .envs(&invocation.env);
        run_streaming(&mut command, "build", self.log_dir.as_deref())
    }
}

/// `git apply`.
#[derive(Debug, Clone, Default)]
pub struct GitApply {
    log_dir: Option<PathBuf>,
}

impl GitApply {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }
}

impl PatchApplier for GitApply {
    fn apply(&self, repo_dir: &Path, patch: &Path) -> Result<i32, ProcessError> {
        let mut command = Command::new("git");
        command.arg("apply").arg(patch).current_dir(repo_dir);
        Ok(run_streaming(&mut command, "patch", self.log_dir.as_deref())?.code)
    }
}
