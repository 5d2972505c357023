//! Child process execution with streamed output.
//!
//! Every external tool runs through [`run_streaming`]: stdout and stderr are
//! read line by line on two threads, forwarded to the log (stderr of the
//! worker, since stdout carries the RPC response), optionally appended to a
//! log file, and the last lines are kept for diagnostics.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

/// Number of trailing output lines kept per process.
pub const TAIL_LINES: usize = 50;

/// Exit code reported for a process terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Errors from running a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What the orchestrator gets to see of a child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, or [`SIGNALED_EXIT_CODE`] if killed by a signal.
    pub code: i32,
    /// Last [`TAIL_LINES`] lines of combined output.
    pub tail: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `command` to completion, streaming its output.
///
/// `label` prefixes every forwarded line and names the log file
/// (`<log_dir>/<label>.log`) when `log_dir` is set.
pub fn run_streaming(
    command: &mut Command,
    label: &str,
    log_dir: Option<&Path>,
) -> Result<ProcessOutcome, ProcessError> {
    let program = command.get_program().to_string_lossy().to_string();
    tracing::debug!(label, program = %program, "spawning");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let log_file = match log_dir {
        Some(dir) => Some(open_log(dir, label)?),
        None => None,
    };

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let log_file = Arc::new(Mutex::new(log_file));
    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));

    let stdout_handle = child
        .stdout
        .take()
        .map(|out| forward(out, label.to_string(), "", Arc::clone(&log_file), Arc::clone(&tail)));
    let stderr_handle = child.stderr.take().map(|err| {
        forward(
            err,
            label.to_string(),
            "[stderr] ",
            Arc::clone(&log_file),
            Arc::clone(&tail),
        )
    });

    let status = child.wait()?;

    for handle in [stdout_handle, stderr_handle].into_iter().flatten() {
        let _ = handle.join();
    }

    let code = status.code().unwrap_or(SIGNALED_EXIT_CODE);
    tracing::debug!(label, code, "process exited");

    let tail = tail
        .lock()
        .map(|lines| lines.iter().cloned().collect())
        .unwrap_or_default();

    Ok(ProcessOutcome { code, tail })
}

fn open_log(dir: &Path, label: &str) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    let path: PathBuf = dir.join(format!("{}.log", label));
    OpenOptions::new().create(true).append(true).open(path)
}

fn forward<R: Read + Send + 'static>(
    reader: R,
    label: String,
    prefix: &'static str,
    log_file: Arc<Mutex<Option<File>>>,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines().map_while(Result::ok) {
            tracing::info!("[{}] {}{}", label, prefix, line);

            if let Ok(mut guard) = log_file.lock() {
                if let Some(file) = guard.as_mut() {
                    let _ = writeln!(file, "{}{}", prefix, line);
                }
            }

            if let Ok(mut lines) = tail.lock() {
                if lines.len() == TAIL_LINES {
                    lines.pop_front();
                }
                lines.push_back(format!("{}{}", prefix, line));
            }
        }
    })
}

/// Log `df -h` output. Diagnostic only: failures are logged and ignored.
pub fn report_disk_usage(log_dir: Option<&Path>) {
    tracing::info!("=== Disk Space ===");
    let mut command = Command::new("df");
    command.arg("-h");
    match run_streaming(&mut command, "df", log_dir) {
        Ok(outcome) if !outcome.success() => {
            tracing::warn!("df exited with code {}", outcome.code);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("could not report disk usage: {}", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn test_exit_code_captured() {
        let outcome = run_streaming(&mut sh("exit 3"), "test", None).unwrap();
        assert_eq!(outcome.code, 3);
        assert!(!outcome.success());
    }

    #[test]
    fn test_output_tail_captured() {
        let outcome = run_streaming(&mut sh("echo one; echo two >&2"), "test", None).unwrap();
        assert!(outcome.success());
        assert!(outcome.tail.contains(&"one".to_string()));
        assert!(outcome.tail.contains(&"[stderr] two".to_string()));
    }

    #[test]
    fn test_tail_is_bounded() {
        let outcome = run_streaming(&mut sh("seq 1 200"), "test", None).unwrap();
        assert_eq!(outcome.tail.len(), TAIL_LINES);
        assert_eq!(outcome.tail.last().unwrap(), "200");
        assert_eq!(outcome.tail.first().unwrap(), "151");
    }

    #[test]
    fn test_log_file_written() {
        let dir = TempDir::new().unwrap();
        run_streaming(&mut sh("echo hello"), "sync", Some(dir.path())).unwrap();
        let log = fs::read_to_string(dir.path().join("sync.log")).unwrap();
        assert_eq!(log, "hello\n");
    }

    #[test]
    fn test_spawn_failure() {
        let mut command = Command::new("/definitely/not/a/binary");
        let err = run_streaming(&mut command, "missing", None).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
