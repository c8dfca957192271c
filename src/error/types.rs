//! Error types for allpath RPC.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for client calls and the reference server.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The request was rejected locally before any socket was opened.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The endpoint is missing, refused the connection, or dropped it mid-call.
    #[error("Connection error on {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No complete response arrived within the call budget.
    #[error("Call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The response bytes are not a JSON object.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// The daemon answered with an `error` key.
    #[error("Remote error: {detail}")]
    Remote { detail: String },

    /// Server socket setup errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Framing errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// Server-side dispatch errors.
    #[error("Function error: {kind}")]
    Function { kind: FunctionErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: more than {max} bytes")]
    MessageTooLarge { max: usize },

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Connection timed out")]
    ConnectionTimeout,
}

/// Function dispatch error kinds.
///
/// The `Display` text of these is what the server writes into the
/// response's `error` key.
#[derive(Error, Debug)]
pub enum FunctionErrorKind {
    #[error("Unknown function '{name}'. Available: {available:?}")]
    UnknownFunction {
        name: String,
        available: Vec<String>,
    },

    #[error("Unknown package '{package}'")]
    UnknownPackage { package: String },

    #[error("Wrong args for '{name}': expected {expected}, got {got}")]
    WrongArgs {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("{message}")]
    Failed { message: String },
}

/// Coarse classification of an [`RpcError`], for caller retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    MalformedResponse,
    Remote,
    /// Anything raised locally: configuration, invalid input, server internals.
    Local,
}

impl RpcError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Connection { .. } => ErrorKind::Connection,
            RpcError::Timeout { .. } => ErrorKind::Timeout,
            RpcError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            RpcError::Remote { .. } => ErrorKind::Remote,
            _ => ErrorKind::Local,
        }
    }

    /// Whether issuing the same call again could plausibly succeed.
    ///
    /// Only transport failures qualify; a `Remote` error caused by bad
    /// input will fail the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout)
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        RpcError::MalformedResponse {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        RpcError::InvalidRequest {
            message: message.into(),
        }
    }

    pub(crate) fn function_failed(message: impl Into<String>) -> Self {
        RpcError::Function {
            kind: FunctionErrorKind::Failed {
                message: message.into(),
            },
        }
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
