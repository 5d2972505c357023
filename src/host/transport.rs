//! Transport Layer
//!
//! Carries one RPC request to the worker and brings one response back:
//! - Transport trait: interface the client talks to
//! - SshTransport: forced-command execution on the build host
//! - LocalTransport: spawns the worker binary on this machine
//!
//! Both transports write the request line to the child's stdin, read the
//! response line from its stdout and pass the worker's stderr (progress
//! logs) straight through to the user's terminal. The invocation deadline
//! is enforced here: the child runs in its own process group and an expired
//! deadline terminates the whole group, so tools the worker started go with
//! it.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use aosp_protocol::{RpcRequest, RpcResponse};

use crate::config::{ConfigError, TransportKind, TransportSettings};
use crate::timeout::InvocationDeadline;

/// How often a running invocation is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Time a terminated process group gets to exit before SIGKILL.
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Transport trait for RPC communication
pub trait Transport: Send + Sync {
    /// Execute an RPC request within `deadline` and return the response
    fn execute(
        &self,
        request: &RpcRequest,
        deadline: &InvocationDeadline,
    ) -> Result<RpcResponse, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invocation timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{program} exited with {status} without a response")]
    Exited { program: String, status: ExitStatus },
}

/// Build the transport selected by configuration.
pub fn from_settings(settings: &TransportSettings) -> Result<Arc<dyn Transport>, ConfigError> {
    match settings.kind {
        TransportKind::Ssh => {
            let host = settings.host.clone().ok_or_else(|| {
                ConfigError::ValidationError(
                    "transport.host is required for the ssh transport".to_string(),
                )
            })?;
            Ok(Arc::new(SshTransport::new(SshConfig {
                host,
                user: settings.user.clone(),
                port: settings.port,
                identity_file: settings.identity_file.clone(),
                connect_timeout_seconds: settings.connect_timeout_seconds,
                remote_command: settings.worker_command.clone(),
                ..SshConfig::default()
            })))
        }
        TransportKind::Local => Ok(Arc::new(
            LocalTransport::new(&settings.worker_binary).arg("rpc"),
        )),
    }
}

/// SSH transport configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote host
    pub host: String,
    /// SSH user
    pub user: String,
    /// SSH port (default 22)
    pub port: u16,
    /// Path to SSH private key
    pub identity_file: Option<PathBuf>,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
    /// Server alive interval for detecting dead connections
    pub server_alive_interval: u32,
    /// Server alive count max
    pub server_alive_count_max: u32,
    /// Command run on the build host
    pub remote_command: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: "aosp".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout_seconds: 30,
            server_alive_interval: 15,
            server_alive_count_max: 4,
            remote_command: "aosp-worker rpc".to_string(),
        }
    }
}

/// SSH transport for production use
///
/// Executes RPC requests over SSH using forced-command execution.
/// Format: Single JSON request on stdin → single JSON response on stdout.
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    /// Create a new SSH transport with the given configuration
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Build SSH command arguments
    pub fn build_ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_seconds),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.config.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.config.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            self.config.port.to_string(),
        ];

        if let Some(ref identity) = self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().to_string());
        }

        args.push(format!("{}@{}", self.config.user, self.config.host));
        args.push(self.config.remote_command.clone());

        args
    }
}

impl Transport for SshTransport {
    fn execute(
        &self,
        request: &RpcRequest,
        deadline: &InvocationDeadline,
    ) -> Result<RpcResponse, TransportError> {
        tracing::debug!(host = %self.config.host, op = %request.op, "invoking worker over ssh");
        let mut command = Command::new("ssh");
        command.args(self.build_ssh_args());
        invoke(&mut command, "ssh", request, deadline)
    }
}

/// Runs the worker binary as a local child process.
pub struct LocalTransport {
    program: PathBuf,
    args: Vec<String>,
    envs: BTreeMap<String, String>,
}

impl LocalTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the worker (e.g. `AOSP_WORKER_ARTIFACTS_ROOT`).
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }
}

impl Transport for LocalTransport {
    fn execute(
        &self,
        request: &RpcRequest,
        deadline: &InvocationDeadline,
    ) -> Result<RpcResponse, TransportError> {
        let label = self.program.display().to_string();
        tracing::debug!(program = %label, op = %request.op, "invoking local worker");
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(&self.envs);
        invoke(&mut command, &label, request, deadline)
    }
}

/// Spawn `command`, send the request line and wait for the response under
/// the deadline.
fn invoke(
    command: &mut Command,
    program: &str,
    request: &RpcRequest,
    deadline: &InvocationDeadline,
) -> Result<RpcResponse, TransportError> {
    let request_json = serde_json::to_string(request)?;

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| TransportError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Drain stdout before writing so a large request cannot deadlock
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| TransportError::Protocol("child stdout not captured".to_string()))?;
    let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(buf)
    });

    if let Some(mut stdin) = child.stdin.take() {
        // A worker that dies early closes its stdin; the exit status says why
        if let Err(e) = writeln!(stdin, "{}", request_json).and_then(|_| stdin.flush()) {
            tracing::debug!("request write failed: {}", e);
        }
    }

    let status = wait_with_deadline(&mut child, deadline)?;

    let output = reader
        .join()
        .map_err(|_| TransportError::Protocol("stdout reader panicked".to_string()))??;

    parse_response(&output, program, status)
}

/// Wait for the child, terminating its process group once the deadline
/// passes.
fn wait_with_deadline(
    child: &mut Child,
    deadline: &InvocationDeadline,
) -> Result<ExitStatus, TransportError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if deadline.expired() {
            tracing::warn!("invocation exceeded {:?}, terminating", deadline.limit());
            terminate_group(child)?;
            return Err(TransportError::Timeout {
                limit: deadline.limit(),
            });
        }
        thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
    }
}

/// SIGTERM the child's process group, then SIGKILL whatever is left after
/// the grace period.
#[cfg(unix)]
fn terminate_group(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = Pid::from_raw(child.id() as i32);
    let _ = killpg(group, Signal::SIGTERM);

    let start = Instant::now();
    while start.elapsed() < TERMINATION_GRACE {
        if child.try_wait()?.is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    // The leader may be gone while group members ignoring SIGTERM remain
    let _ = killpg(group, Signal::SIGKILL);
    child.wait()?;
    Ok(())
}

#[cfg(not(unix))]
fn terminate_group(child: &mut Child) -> io::Result<()> {
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

/// The response is the first non-empty stdout line.
fn parse_response(
    output: &[u8],
    program: &str,
    status: ExitStatus,
) -> Result<RpcResponse, TransportError> {
    let text = String::from_utf8_lossy(output);
    let Some(line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(TransportError::Exited {
            program: program.to_string(),
            status,
        });
    };

    serde_json::from_str(line)
        .map_err(|e| TransportError::Protocol(format!("Invalid response JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aosp_protocol::ops::{names, ListArtifactsRequest, ListArtifactsResponse};
    use std::path::Path;

    fn request() -> RpcRequest {
        RpcRequest::new(1, names::LIST_ARTIFACTS, "req-1", &ListArtifactsRequest {}).unwrap()
    }

    fn shell(script: &str) -> LocalTransport {
        LocalTransport::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_local_transport_reads_response_line() {
        let transport = shell(
            "read line; echo progress >&2; \
             echo '{\"protocol_version\":1,\"request_id\":\"req-1\",\"ok\":true,\"payload\":{\"artifacts\":[]}}'",
        );
        let deadline = InvocationDeadline::new(Duration::from_secs(10));

        let response = transport.execute(&request(), &deadline).unwrap();
        assert!(response.ok);
        assert_eq!(response.request_id, "req-1");
        let listing: ListArtifactsResponse = response.into_result().unwrap();
        assert!(listing.artifacts.is_empty());
    }

    #[test]
    fn test_request_reaches_stdin() {
        // Echo the request id back through the response
        let transport = shell(
            "read line; id=$(echo \"$line\" | sed 's/.*\"request_id\":\"\\([^\"]*\\)\".*/\\1/'); \
             echo \"{\\\"protocol_version\\\":1,\\\"request_id\\\":\\\"$id\\\",\\\"ok\\\":true,\\\"payload\\\":{}}\"",
        );
        let deadline = InvocationDeadline::new(Duration::from_secs(10));

        let response = transport.execute(&request(), &deadline).unwrap();
        assert_eq!(response.request_id, "req-1");
    }

    #[test]
    fn test_deadline_kills_child() {
        let transport = shell("sleep 30");
        let deadline = InvocationDeadline::new(Duration::from_millis(300));

        let err = transport.execute(&request(), &deadline).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[test]
    fn test_deadline_kills_background_descendants() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let transport = shell(&format!(
            "read line; (sleep 1; touch '{}') & sleep 30",
            marker.display()
        ));
        let deadline = InvocationDeadline::new(Duration::from_millis(300));

        let started = Instant::now();
        let err = transport.execute(&request(), &deadline).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));

        thread::sleep(Duration::from_secs(2));
        assert!(!marker.exists(), "background job outlived the invocation");
    }

    #[test]
    fn test_sub_second_timeout_message() {
        let err = TransportError::Timeout {
            limit: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "Invocation timed out after 300ms");
    }

    #[test]
    fn test_exit_without_response() {
        let transport = shell("read line; exit 3");
        let deadline = InvocationDeadline::new(Duration::from_secs(10));

        let err = transport.execute(&request(), &deadline).unwrap_err();
        match err {
            TransportError::Exited { status, .. } => assert_eq!(status.code(), Some(3)),
            other => panic!("expected Exited, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_response_is_protocol_error() {
        let transport = shell("read line; echo not-json");
        let deadline = InvocationDeadline::new(Duration::from_secs(10));

        let err = transport.execute(&request(), &deadline).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let transport = LocalTransport::new(Path::new("/nonexistent/aosp-worker"));
        let deadline = InvocationDeadline::new(Duration::from_secs(1));

        let err = transport.execute(&request(), &deadline).unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[test]
    fn test_ssh_args() {
        let transport = SshTransport::new(SshConfig {
            host: "builder.internal".to_string(),
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
            connect_timeout_seconds: 15,
            ..SshConfig::default()
        });

        let args = transport.build_ssh_args();
        assert!(args.contains(&"ConnectTimeout=15".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/id_ed25519"));
        assert_eq!(args[args.len() - 2], "aosp@builder.internal");
        assert_eq!(args[args.len() - 1], "aosp-worker rpc");
    }
}
