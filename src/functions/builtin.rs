//! Built-in functions every server answers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::error::RpcError;
use crate::providers::Provider;

use super::traits::{CallContext, RemoteFunction};

/// Health check: `{"pong": true, ...}`.
pub struct PingFunction;

impl RemoteFunction for PingFunction {
    fn name(&self) -> &str {
        "ping"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn call(&self, ctx: &CallContext, _args: &[String]) -> Result<Value, RpcError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(json!({
            "pong": true,
            "timestamp": timestamp,
            "request_id": ctx.request_id.to_string(),
        }))
    }
}

/// Server version, package, and supported providers.
pub struct VersionFunction {
    package: String,
}

impl VersionFunction {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }
}

impl RemoteFunction for VersionFunction {
    fn name(&self) -> &str {
        "version"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn call(&self, _ctx: &CallContext, _args: &[String]) -> Result<Value, RpcError> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "package": self.package,
            "providers": Provider::names(),
        }))
    }
}
