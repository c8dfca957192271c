//! Allpath RPC
//!
//! Single-shot JSON remote procedure calls over a local Unix domain socket.
//! A call opens a connection, writes one `{"package", "function", "args"}`
//! envelope, half-closes, and reads one JSON object back until the daemon
//! closes. An `error` key in the reply marks failure.
//!
//! The crate provides the codec ([`protocol`]), the client ([`client`]),
//! and a reference server ([`socket`] + [`functions`]) used for testing
//! and local development.

pub mod client;
pub mod config;
pub mod error;
pub mod functions;
pub mod protocol;
pub mod providers;
pub mod socket;

pub use client::{BlockingClient, RpcClient};
pub use config::{ClientConfig, ServerConfig, Settings};
pub use error::{ErrorKind, RpcError, RpcResult};
pub use protocol::{Request, Response};
pub use providers::Provider;
