//! Synchronous facade over [`RpcClient`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::runtime::{Builder, Runtime};

use crate::config::ClientConfig;
use crate::error::RpcResult;
use crate::protocol::{Request, Response};
use crate::providers::Provider;

use super::rpc::RpcClient;
use super::types::{ByakuganOutput, RunOutput, SkillCheck, VersionInfo};

/// Blocking client for callers without an async runtime.
///
/// Owns a current-thread runtime and blocks the calling thread for the
/// duration of each call. Must not be used from inside another tokio
/// runtime.
pub struct BlockingClient {
    inner: RpcClient,
    runtime: Runtime,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> RpcResult<Self> {
        let inner = RpcClient::new(config)?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    /// See [`RpcClient::call`].
    pub fn call<I, S>(&self, function: &str, args: I) -> RpcResult<Map<String, Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime.block_on(self.inner.call(function, args))
    }

    /// See [`RpcClient::call_as`].
    pub fn call_as<T, I, S>(&self, function: &str, args: I) -> RpcResult<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime.block_on(self.inner.call_as(function, args))
    }

    pub fn exchange(&self, request: &Request) -> RpcResult<Response> {
        self.runtime.block_on(self.inner.exchange(request))
    }

    pub fn run(
        &self,
        task: &str,
        api_key: &str,
        provider: Provider,
        model: Option<&str>,
        verbose: bool,
    ) -> RpcResult<RunOutput> {
        self.runtime
            .block_on(self.inner.run(task, api_key, provider, model, verbose))
    }

    pub fn byakugan(
        &self,
        task: &str,
        api_key: &str,
        provider: Provider,
        model: Option<&str>,
    ) -> RpcResult<ByakuganOutput> {
        self.runtime
            .block_on(self.inner.byakugan(task, api_key, provider, model))
    }

    pub fn skills_count(&self) -> RpcResult<u64> {
        self.runtime.block_on(self.inner.skills_count())
    }

    pub fn check_skill(&self, content: &str) -> RpcResult<SkillCheck> {
        self.runtime.block_on(self.inner.check_skill(content))
    }

    pub fn version(&self) -> RpcResult<VersionInfo> {
        self.runtime.block_on(self.inner.version())
    }
}
