//! AOSP Builder Worker Entrypoint
//!
//! Usage: aosp-worker rpc
//!
//! Reads a single JSON RPC request from stdin, dispatches to the
//! appropriate handler, and writes a JSON response to stdout.
//! Logs go to stderr; `RUST_LOG` controls the level (default `info`).

use std::process::ExitCode;

use aosp_worker::{RpcHandler, WorkerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() >= 2 && args[1] == "rpc" {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();

        let config = WorkerConfig::from_env();
        tracing::debug!(?config, "worker configuration");
        let handler = RpcHandler::new(config);

        if let Err(e) = handler.run() {
            tracing::error!("RPC handler error: {}", e);
            return ExitCode::FAILURE;
        }

        ExitCode::SUCCESS
    } else {
        eprintln!("Usage: aosp-worker rpc");
        eprintln!();
        eprintln!("Runs the RPC handler, reading JSON from stdin and writing to stdout.");
        ExitCode::FAILURE
    }
}
