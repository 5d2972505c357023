//! In-memory tool fakes.
//!
//! Each fake is cheap to clone and shares its state, so a test can hand one
//! clone to [`Tooling`] and keep another to inspect the recorded calls.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use aosp_protocol::ops::SourceSpec;

use crate::orchestrator::SENTINEL;
use crate::process::{ProcessError, ProcessOutcome};
use crate::tools::{
    BuildDriver, BuildInvocation, PatchApplier, SourceFetcher, SyncOptions, Tooling,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncAttempt {
    pub code: i32,
    /// Whether the attempt leaves `build/envsetup.sh` behind.
    pub creates_sentinel: bool,
}

/// A call made to a [`FakeFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    Init { branch: String, depth: u32 },
    Sync(SyncOptions),
}

#[derive(Debug, Default)]
struct FetcherState {
    init_code: i32,
    attempts: VecDeque<SyncAttempt>,
    calls: Vec<FetchCall>,
}

/// Source fetcher replaying scripted sync attempts.
///
/// Once the script is exhausted every further sync exits 0 without creating
/// the sentinel.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher whose first sync succeeds and populates the tree.
    pub fn succeeding() -> Self {
        Self::new().then_sync(0, true)
    }

    pub fn with_init_code(self, code: i32) -> Self {
        lock(&self.state).init_code = code;
        self
    }

    /// Append one scripted sync attempt.
    pub fn then_sync(self, code: i32, creates_sentinel: bool) -> Self {
        lock(&self.state).attempts.push_back(SyncAttempt {
            code,
            creates_sentinel,
        });
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.state).calls.clone()
    }

    /// Options of every sync call, in order.
    pub fn sync_calls(&self) -> Vec<SyncOptions> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FetchCall::Sync(options) => Some(options),
                FetchCall::Init { .. } => None,
            })
            .collect()
    }
}

impl SourceFetcher for FakeFetcher {
    fn init(&self, _root: &Path, spec: &SourceSpec) -> Result<i32, ProcessError> {
        let mut state = lock(&self.state);
        state.calls.push(FetchCall::Init {
            branch: spec.branch.clone(),
            depth: spec.depth,
        });
        Ok(state.init_code)
    }

    fn sync(&self, root: &Path, options: SyncOptions) -> Result<i32, ProcessError> {
        let mut state = lock(&self.state);
        state.calls.push(FetchCall::Sync(options));
        let attempt = state.attempts.pop_front().unwrap_or(SyncAttempt {
            code: 0,
            creates_sentinel: false,
        });
        drop(state);

        if attempt.creates_sentinel {
            let sentinel = root.join(SENTINEL);
            if let Some(parent) = sentinel.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(sentinel, "# envsetup\n")?;
        }
        Ok(attempt.code)
    }
}

#[derive(Debug, Default)]
struct DriverState {
    code: i32,
    outputs: Vec<(String, String, Vec<u8>)>,
    invocations: Vec<BuildInvocation>,
}

/// Build driver that writes scripted images and exits with a fixed code.
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver that exits with `code`.
    pub fn exiting(code: i32) -> Self {
        let driver = Self::new();
        lock(&driver.state).code = code;
        driver
    }

    /// Write `name` under `out/target/product/<product>/` when the build runs.
    pub fn with_output(self, product: &str, name: &str, contents: impl Into<Vec<u8>>) -> Self {
        lock(&self.state)
            .outputs
            .push((product.to_string(), name.to_string(), contents.into()));
        self
    }

    pub fn invocations(&self) -> Vec<BuildInvocation> {
        lock(&self.state).invocations.clone()
    }
}

impl BuildDriver for FakeDriver {
    fn build(
        &self,
        root: &Path,
        invocation: &BuildInvocation,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut state = lock(&self.state);
        state.invocations.push(invocation.clone());

        for (product, name, contents) in &state.outputs {
            let dir = root.join("out/target/product").join(product);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(name), contents)?;
        }

        Ok(ProcessOutcome {
            code: state.code,
            tail: vec![format!("fake build exited with {}", state.code)],
        })
    }
}

#[derive(Debug, Default)]
struct PatcherState {
    failing: BTreeSet<String>,
    calls: Vec<(PathBuf, PathBuf)>,
}

/// Patch applier that records every patch and rejects the named ones.
#[derive(Debug, Clone, Default)]
pub struct FakePatcher {
    state: Arc<Mutex<PatcherState>>,
}

impl FakePatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the patch with this file name fail to apply.
    pub fn failing_on(self, file_name: &str) -> Self {
        lock(&self.state).failing.insert(file_name.to_string());
        self
    }

    /// `(repo_dir, patch)` of every apply call, in order.
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        lock(&self.state).calls.clone()
    }

    /// File names of the patches attempted, in order.
    pub fn patch_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|(_, patch)| patch.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect()
    }
}

impl PatchApplier for FakePatcher {
    fn apply(&self, repo_dir: &Path, patch: &Path) -> Result<i32, ProcessError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push((repo_dir.to_path_buf(), patch.to_path_buf()));
        let name = patch
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(if state.failing.contains(&name) { 1 } else { 0 })
    }
}

/// Bundle the three fakes into a [`Tooling`].
pub fn tooling(fetcher: &FakeFetcher, driver: &FakeDriver, patcher: &FakePatcher) -> Tooling {
    Tooling {
        fetcher: Box::new(fetcher.clone()),
        driver: Box::new(driver.clone()),
        patcher: Box::new(patcher.clone()),
    }
}
