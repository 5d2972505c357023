//! Host-Side Components
//!
//! Talks to the worker: transports that carry one request per invocation
//! and the typed client on top of them.

pub mod client;
pub mod transport;

pub use client::{BuilderClient, ClientError, ClientResult};
pub use transport::{LocalTransport, SshConfig, SshTransport, Transport, TransportError};
