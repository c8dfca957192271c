//! Error types for the RPC client and reference server.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
