//! Function registry for dispatching requests to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{FunctionErrorKind, RpcError};

use super::builtin::{PingFunction, VersionFunction};
use super::traits::{CallContext, RemoteFunction};

type Handler = dyn Fn(&[String]) -> Result<Value, RpcError> + Send + Sync;

/// A [`RemoteFunction`] backed by a closure.
pub struct FnFunction {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    handler: Box<Handler>,
}

impl FnFunction {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_args: 0,
            max_args: None,
            handler: Box::new(handler),
        }
    }

    /// Restrict the accepted argument count.
    pub fn with_arity(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }
}

impl RemoteFunction for FnFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_args(&self) -> usize {
        self.min_args
    }

    fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    fn call(&self, _ctx: &CallContext, args: &[String]) -> Result<Value, RpcError> {
        (self.handler)(args)
    }
}

/// Registry of callable functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn RemoteFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with `ping` and `version` installed.
    pub fn with_builtins(package: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PingFunction));
        registry.register(Arc::new(VersionFunction::new(package)));

        info!(
            count = registry.functions.len(),
            "Function registry initialized"
        );

        registry
    }

    /// Register a function, replacing any previous one with the same name.
    pub fn register(&mut self, function: Arc<dyn RemoteFunction>) -> &mut Self {
        let name = function.name().to_string();
        debug!(function = %name, "Registering function");
        self.functions.insert(name, function);
        self
    }

    /// Register a closure under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&[String]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFunction::new(name, handler)))
    }

    /// Get a function by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RemoteFunction>> {
        self.functions.get(name).cloned()
    }

    /// Dispatch a call to the named function.
    pub fn dispatch(
        &self,
        ctx: &CallContext,
        function_name: &str,
        args: &[String],
    ) -> Result<Value, RpcError> {
        let function = self
            .functions
            .get(function_name)
            .ok_or_else(|| RpcError::Function {
                kind: FunctionErrorKind::UnknownFunction {
                    name: function_name.to_string(),
                    available: self.list_functions(),
                },
            })?;

        function.validate(args)?;

        function.call(ctx, args)
    }

    /// All registered function names, sorted.
    pub fn list_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
