//! Request envelope.

use serde::{Deserialize, Serialize};

use crate::error::{RpcError, RpcResult};

/// One call's envelope: service namespace, function name, positional args.
///
/// Field order here is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Logical service namespace (e.g., "dojutsu-agent").
    #[serde(default)]
    pub package: String,

    /// Name of the remote operation. Never empty.
    pub function: String,

    /// Positional arguments, order preserved.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Request {
    /// Build a request, rejecting an empty function name.
    pub fn new<I, S>(package: impl Into<String>, function: impl Into<String>, args: I) -> RpcResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = Self {
            package: package.into(),
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the envelope invariants.
    pub fn validate(&self) -> RpcResult<()> {
        if self.function.is_empty() {
            return Err(RpcError::invalid_request("function name must not be empty"));
        }
        Ok(())
    }
}
