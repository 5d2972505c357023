//! SYNC phase: fetch the source tree, retrying once.

use std::path::Path;

use aosp_protocol::ops::SourceSpec;

use crate::process::SIGNALED_EXIT_CODE;
use crate::tools::{SourceFetcher, SyncOptions};

use super::SENTINEL;

/// Result of the SYNC phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The sentinel exists; `retried` is true when the first attempt failed.
    Ready { retried: bool },
    /// `repo init` exited non-zero. Nothing was synced.
    InitFailed { code: i32 },
    /// The sentinel is missing after the retry.
    SentinelMissing,
}

/// Init, sync, retry once if the first sync exits non-zero, then gate on
/// the sentinel.
///
/// The exit codes of the sync attempts only decide whether to retry. Whether
/// the tree is usable is decided by the sentinel alone.
pub fn sync_source(fetcher: &dyn SourceFetcher, root: &Path, spec: &SourceSpec) -> SyncOutcome {
    tracing::info!("=== Phase 1: Syncing AOSP source ===");

    tracing::info!("Initializing repo...");
    let init_code = fetcher.init(root, spec).unwrap_or_else(|e| {
        tracing::error!("repo init could not run: {}", e);
        SIGNALED_EXIT_CODE
    });
    if init_code != 0 {
        tracing::error!("repo init failed with code {}", init_code);
        return SyncOutcome::InitFailed { code: init_code };
    }

    tracing::info!("Syncing AOSP...");
    let first = attempt(
        fetcher,
        root,
        SyncOptions {
            jobs: spec.sync_jobs,
            force: false,
        },
    );

    let retried = first != 0;
    if retried {
        tracing::warn!("WARNING: Sync had errors (code {}), retrying with fewer jobs...", first);
        let second = attempt(
            fetcher,
            root,
            SyncOptions {
                jobs: spec.retry_jobs,
                force: true,
            },
        );
        if second != 0 {
            tracing::warn!("Retry sync exited with code {}, checking tree anyway", second);
        }
    }

    if !root.join(SENTINEL).exists() {
        tracing::error!("{} not found after sync", SENTINEL);
        return SyncOutcome::SentinelMissing;
    }

    tracing::info!("AOSP sync complete!");
    SyncOutcome::Ready { retried }
}

fn attempt(fetcher: &dyn SourceFetcher, root: &Path, options: SyncOptions) -> i32 {
    fetcher.sync(root, options).unwrap_or_else(|e| {
        tracing::warn!("repo sync could not run: {}", e);
        SIGNALED_EXIT_CODE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeFetcher, FetchCall};
    use tempfile::TempDir;

    fn run(fetcher: &FakeFetcher) -> (SyncOutcome, TempDir) {
        let dir = TempDir::new().unwrap();
        let outcome = sync_source(fetcher, dir.path(), &SourceSpec::default());
        (outcome, dir)
    }

    #[test]
    fn test_clean_sync_does_not_retry() {
        let fetcher = FakeFetcher::succeeding();
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::Ready { retried: false });
        assert_eq!(
            fetcher.sync_calls(),
            vec![SyncOptions {
                jobs: 16,
                force: false
            }]
        );
    }

    #[test]
    fn test_failed_sync_retries_once_with_force() {
        let fetcher = FakeFetcher::new().then_sync(1, false).then_sync(0, true);
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::Ready { retried: true });
        assert_eq!(
            fetcher.sync_calls(),
            vec![
                SyncOptions {
                    jobs: 16,
                    force: false
                },
                SyncOptions { jobs: 4, force: true },
            ]
        );
    }

    #[test]
    fn test_sentinel_overrides_failed_exit_codes() {
        // both attempts fail, but the first one left a usable tree behind
        let fetcher = FakeFetcher::new().then_sync(1, true).then_sync(1, false);
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::Ready { retried: true });
        assert_eq!(fetcher.sync_calls().len(), 2);
    }

    #[test]
    fn test_missing_sentinel_fails_despite_clean_exit() {
        let fetcher = FakeFetcher::new().then_sync(0, false);
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::SentinelMissing);
        assert_eq!(fetcher.sync_calls().len(), 1);
    }

    #[test]
    fn test_missing_sentinel_after_retry() {
        let fetcher = FakeFetcher::new().then_sync(1, false).then_sync(1, false);
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::SentinelMissing);
        assert_eq!(fetcher.sync_calls().len(), 2);
    }

    #[test]
    fn test_init_failure_is_terminal() {
        let fetcher = FakeFetcher::succeeding().with_init_code(128);
        let (outcome, _dir) = run(&fetcher);

        assert_eq!(outcome, SyncOutcome::InitFailed { code: 128 });
        assert!(fetcher.sync_calls().is_empty());
        assert_eq!(
            fetcher.calls(),
            vec![FetchCall::Init {
                branch: "android-13.0.0_r83".to_string(),
                depth: 1
            }]
        );
    }
}
