//! COMPILE phase.

use std::collections::BTreeMap;
use std::path::Path;

use crate::process::{ProcessOutcome, SIGNALED_EXIT_CODE};
use crate::tools::{BuildDriver, BuildInvocation};

/// Environment overrides that keep dex optimization and the ART APEX out of
/// the build. dex2oat crashes in the remote sandbox.
pub const BUILD_ENV: [(&str, &str); 7] = [
    ("WITH_DEXPREOPT", "false"),
    ("DONT_DEXPREOPT_PREBUILTS", "true"),
    ("ART_BUILD_HOST_DEBUG", "false"),
    ("SKIP_BOOT_JARS_CHECK", "true"),
    ("WITH_HOST_DALVIK", "false"),
    (
        "DEXPREOPT_DISABLED_MODULES",
        "com.android.art com.android.art.debug com.android.art.testing",
    ),
    ("SOONG_CONFIG_art_module_global_disable_apexes", "true"),
];

/// Make variables passed on the `m` command line.
pub const MAKE_VARS: [(&str, &str); 1] = [("BUILD_BROKEN_MISSING_REQUIRED_MODULES", "true")];

/// The invocation for `target` with `jobs` parallel jobs.
pub fn invocation(target: &str, jobs: u32) -> BuildInvocation {
    BuildInvocation {
        target: target.to_string(),
        jobs,
        env: to_map(&BUILD_ENV),
        make_vars: to_map(&MAKE_VARS),
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Run the build driver once. No retry.
///
/// A driver that cannot even be started is reported as a failed build with
/// the signal exit code.
pub fn compile(driver: &dyn BuildDriver, root: &Path, target: &str, jobs: u32) -> ProcessOutcome {
    tracing::info!("=== Phase 3: Building {} ===", target);
    let invocation = invocation(target, jobs);

    match driver.build(root, &invocation) {
        Ok(outcome) => {
            if !outcome.success() {
                tracing::error!("Build failed with code {}", outcome.code);
            }
            outcome
        }
        Err(e) => {
            tracing::error!("Build could not run: {}", e);
            ProcessOutcome {
                code: SIGNALED_EXIT_CODE,
                tail: vec![e.to_string()],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeDriver;
    use tempfile::TempDir;

    #[test]
    fn test_invocation_carries_overrides() {
        let inv = invocation("agi_os_x86_64-eng", 32);
        assert_eq!(inv.env.len(), 7);
        assert_eq!(inv.env["WITH_DEXPREOPT"], "false");
        assert_eq!(
            inv.env["DEXPREOPT_DISABLED_MODULES"],
            "com.android.art com.android.art.debug com.android.art.testing"
        );
        assert_eq!(inv.make_vars["BUILD_BROKEN_MISSING_REQUIRED_MODULES"], "true");
        assert_eq!(inv.jobs, 32);
    }

    #[test]
    fn test_failure_code_is_reported() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::exiting(2);

        let outcome = compile(&driver, dir.path(), "agi_os_x86_64-eng", 8);

        assert_eq!(outcome.code, 2);
        assert_eq!(driver.invocations().len(), 1);
        assert_eq!(driver.invocations()[0].target, "agi_os_x86_64-eng");
    }
}
