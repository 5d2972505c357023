//! AOSP Builder - remote AOSP build with local component overlays
//!
//! Host side of the builder: layered configuration, packaging of the local
//! component directories, transports to the remote worker and the
//! `status`/`fullbuild`/`download` actions on top of them.

pub mod config;
pub mod host;
pub mod inputs;
pub mod pipeline;
pub mod report;
pub mod timeout;

pub use config::{ConfigError, EffectiveConfig, Settings};
pub use host::{BuilderClient, ClientError, LocalTransport, SshTransport, Transport, TransportError};
pub use pipeline::{run_action, Action, ActionReport, PipelineError};
