//! Async client for the allpath runner daemon.

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ProtocolErrorKind, RpcError, RpcResult};
use crate::protocol::{
    decode_response, encode_request, read_to_close, write_and_half_close, Request, Response,
};
use crate::providers::Provider;

use super::types::{ByakuganOutput, RunOutput, SkillCheck, SkillsCount, VersionInfo};

/// Client for single-shot calls over the daemon's Unix socket.
///
/// Holds only configuration. Every call opens its own connection, so one
/// client can be shared by concurrent tasks without locking.
#[derive(Debug, Clone)]
pub struct RpcClient {
    config: ClientConfig,
}

impl RpcClient {
    /// Create a client. Fails if the configuration is invalid.
    pub fn new(config: ClientConfig) -> RpcResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call `function` with positional `args`.
    ///
    /// Returns the success map, or:
    /// - `Connection` if the socket is missing, refuses, or drops mid-call
    /// - `Timeout` if the whole call exceeds the configured budget
    /// - `MalformedResponse` if the reply is not a JSON object
    /// - `Remote` if the reply carries an `error` key
    pub async fn call<I, S>(&self, function: &str, args: I) -> RpcResult<Map<String, Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = Request::new(self.config.package.as_str(), function, args)?;
        let response = self.exchange(&request).await?;

        if let Response::Failure { detail } = &response {
            debug!(function = %request.function, detail = %detail, "Daemon reported an error");
        }

        response.into_result()
    }

    /// Call `function` and deserialize the success map into `T`.
    ///
    /// A shape mismatch is reported as `MalformedResponse`.
    pub async fn call_as<T, I, S>(&self, function: &str, args: I) -> RpcResult<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let map = self.call(function, args).await?;
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            RpcError::malformed(format!("unexpected '{}' response shape: {}", function, e))
        })
    }

    /// Send a prepared request and return the decoded, unmapped response.
    ///
    /// Connect, write, half-close and read all share one timeout. When it
    /// fires the in-flight future is dropped, which closes the socket, so
    /// the daemon sees a broken pipe instead of a lingering peer.
    pub async fn exchange(&self, request: &Request) -> RpcResult<Response> {
        let payload = encode_request(request)?;
        let started = Instant::now();

        // Argument values can carry credentials; only their count is logged.
        debug!(
            function = %request.function,
            args = request.args.len(),
            endpoint = %self.config.endpoint_path.display(),
            "Calling daemon"
        );

        let bytes = match timeout(self.config.call_timeout(), self.round_trip(&payload)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                debug!(function = %request.function, error = %e, "Call failed");
                return Err(e);
            }
            Err(_) => {
                warn!(
                    function = %request.function,
                    timeout_ms = self.config.call_timeout_ms,
                    "Call timed out"
                );
                return Err(RpcError::Timeout {
                    timeout_ms: self.config.call_timeout_ms,
                });
            }
        };

        debug!(
            function = %request.function,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response received"
        );

        decode_response(&bytes)
    }

    /// One connection, start to finish. The stream is dropped on every
    /// return path, closing both directions.
    async fn round_trip(&self, payload: &[u8]) -> RpcResult<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.config.endpoint_path)
            .await
            .map_err(|source| self.connection_error(source))?;

        write_and_half_close(&mut stream, payload)
            .await
            .map_err(|e| self.transport_error(e))?;

        read_to_close(&mut stream, self.config.max_response_size)
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn connection_error(&self, source: std::io::Error) -> RpcError {
        RpcError::Connection {
            path: self.config.endpoint_path.clone(),
            source,
        }
    }

    fn transport_error(&self, err: RpcError) -> RpcError {
        match err {
            RpcError::Io(source) => self.connection_error(source),
            RpcError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { max },
            } => RpcError::malformed(format!("response exceeds {} bytes", max)),
            other => other,
        }
    }

    /// Run the full generation pipeline on `task`.
    ///
    /// `api_key` is forwarded as an opaque argument. `verbose` asks the
    /// daemon to trace each pipeline step on its side.
    pub async fn run(
        &self,
        task: &str,
        api_key: &str,
        provider: Provider,
        model: Option<&str>,
        verbose: bool,
    ) -> RpcResult<RunOutput> {
        self.call_as("run", pipeline_args(task, api_key, provider, model, verbose))
            .await
    }

    /// Structural analysis only.
    pub async fn byakugan(
        &self,
        task: &str,
        api_key: &str,
        provider: Provider,
        model: Option<&str>,
    ) -> RpcResult<ByakuganOutput> {
        self.call_as("byakugan", pipeline_args(task, api_key, provider, model, false))
            .await
    }

    /// Number of skills indexed by the daemon.
    pub async fn skills_count(&self) -> RpcResult<u64> {
        let count: SkillsCount = self.call_as("skills_count", Vec::<String>::new()).await?;
        Ok(count.count)
    }

    /// Ask the daemon whether a skill document is safe to load.
    pub async fn check_skill(&self, content: &str) -> RpcResult<SkillCheck> {
        self.call_as("check_skill", [content]).await
    }

    pub async fn version(&self) -> RpcResult<VersionInfo> {
        self.call_as("version", Vec::<String>::new()).await
    }
}

/// `[task, api_key, provider, model?, verbose?]`, the pipeline functions'
/// positional order.
///
/// The model slot is filled with `""` when `verbose` has to follow it.
pub(super) fn pipeline_args(
    task: &str,
    api_key: &str,
    provider: Provider,
    model: Option<&str>,
    verbose: bool,
) -> Vec<String> {
    let mut args = vec![
        task.to_string(),
        api_key.to_string(),
        provider.as_str().to_string(),
    ];
    let model = model.filter(|m| !m.is_empty());
    if verbose {
        args.push(model.unwrap_or_default().to_string());
        args.push("true".to_string());
    } else if let Some(model) = model {
        args.push(model.to_string());
    }
    args
}
