//! Remote function trait definition.

use serde_json::Value;
use uuid::Uuid;

use crate::error::{FunctionErrorKind, RpcError};

/// Per-request metadata handed to a function.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Server-assigned identifier, used in logs.
    pub request_id: Uuid,
    /// Package the request was addressed to.
    pub package: String,
}

impl CallContext {
    pub fn new(request_id: Uuid, package: impl Into<String>) -> Self {
        Self {
            request_id,
            package: package.into(),
        }
    }
}

/// Core trait for every function the server can dispatch to.
///
/// # Example
///
/// ```ignore
/// pub struct Echo;
///
/// impl RemoteFunction for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn min_args(&self) -> usize {
///         1
///     }
///
///     fn call(&self, _ctx: &CallContext, args: &[String]) -> Result<Value, RpcError> {
///         Ok(serde_json::json!({"echo": args}))
///     }
/// }
/// ```
pub trait RemoteFunction: Send + Sync {
    /// Name used in the request's `function` field.
    fn name(&self) -> &str;

    /// Fewest positional arguments accepted.
    fn min_args(&self) -> usize {
        0
    }

    /// Most positional arguments accepted; `None` means unbounded.
    fn max_args(&self) -> Option<usize> {
        None
    }

    /// Check the arguments before `call`. Defaults to an arity check.
    fn validate(&self, args: &[String]) -> Result<(), RpcError> {
        let min = self.min_args();
        let max = self.max_args();
        let ok = args.len() >= min && max.map_or(true, |max| args.len() <= max);
        if ok {
            return Ok(());
        }

        let expected = match max {
            Some(max) if max == min => format!("exactly {}", min),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        Err(RpcError::Function {
            kind: FunctionErrorKind::WrongArgs {
                name: self.name().to_string(),
                expected,
                got: args.len(),
            },
        })
    }

    /// Execute the function.
    ///
    /// The returned value becomes the response body; non-object values are
    /// wrapped as `{"result": value}`. Called from a blocking thread.
    fn call(&self, ctx: &CallContext, args: &[String]) -> Result<Value, RpcError>;
}
