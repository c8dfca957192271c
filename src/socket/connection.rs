//! Per-connection handler.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{FunctionErrorKind, ProtocolErrorKind, RpcError};
use crate::functions::{CallContext, FunctionRegistry};
use crate::protocol::{
    decode_request, discard_to_close, encode_response, read_to_close_with_timeout,
    write_and_half_close, Response,
};

/// Handle a single client connection: one request, one response.
///
/// Returns whether the call produced a success response. Errors mean the
/// connection was dropped without a response (read timeout, I/O failure).
pub async fn handle_connection(
    stream: UnixStream,
    config: Arc<ServerConfig>,
    registry: Arc<FunctionRegistry>,
) -> Result<bool, RpcError> {
    let request_id = Uuid::new_v4();
    let (mut reader, mut writer) = stream.into_split();

    // The request is complete once the client half-closes.
    let response = match read_to_close_with_timeout(
        &mut reader,
        config.max_request_size,
        config.read_timeout(),
    )
    .await
    {
        Ok(bytes) => process_request(&bytes, request_id, &config, &registry).await,
        Err(RpcError::Protocol { kind }) if matches!(kind, ProtocolErrorKind::MessageTooLarge { .. }) => {
            warn!(request_id = %request_id, error = %kind, "Rejecting oversized request");
            // The client only reads the reply after its write completes.
            match timeout(config.read_timeout(), discard_to_close(&mut reader)).await {
                Ok(Ok(discarded)) => {
                    debug!(request_id = %request_id, discarded, "Drained oversized request")
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(RpcError::Protocol {
                        kind: ProtocolErrorKind::ConnectionTimeout,
                    })
                }
            }
            Response::failure(kind.to_string())
        }
        Err(e) => return Err(e),
    };

    let success = response.is_success();
    let payload = encode_response(&response)?;

    timeout(config.read_timeout(), write_and_half_close(&mut writer, &payload))
        .await
        .map_err(|_| RpcError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })??;

    debug!(request_id = %request_id, success, bytes = payload.len(), "Response sent");
    Ok(success)
}

/// Decode, check, and dispatch one request. Every failure becomes an
/// error response.
async fn process_request(
    bytes: &[u8],
    request_id: Uuid,
    config: &ServerConfig,
    registry: &Arc<FunctionRegistry>,
) -> Response {
    let request = match decode_request(bytes) {
        Ok(request) => request,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Malformed request");
            return Response::failure(error_detail(&e));
        }
    };

    let start_time = Instant::now();

    info!(
        request_id = %request_id,
        package = %request.package,
        function = %request.function,
        args = request.args.len(),
        "Received request"
    );

    // An empty package means "whatever this server answers for".
    if !request.package.is_empty() && request.package != config.package {
        let kind = FunctionErrorKind::UnknownPackage {
            package: request.package,
        };
        warn!(request_id = %request_id, error = %kind, "Request for another package");
        return Response::failure(kind.to_string());
    }

    let ctx = CallContext::new(request_id, config.package.clone());
    let registry = Arc::clone(registry);
    let function = request.function.clone();

    // Functions may block for a long time (LLM pipelines); keep them off the reactor.
    let result =
        tokio::task::spawn_blocking(move || registry.dispatch(&ctx, &request.function, &request.args))
            .await;

    let duration_ms = start_time.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(value)) => {
            info!(request_id = %request_id, function = %function, duration_ms, "Function completed");
            Response::success(value)
        }
        Ok(Err(e)) => {
            info!(
                request_id = %request_id,
                function = %function,
                duration_ms,
                error = %e,
                "Function failed"
            );
            Response::failure(error_detail(&e))
        }
        Err(e) => {
            error!(request_id = %request_id, function = %function, error = %e, "Function panicked");
            Response::failure(format!("Function '{}' panicked", function))
        }
    }
}

/// Text written into the `error` key for a failed request.
fn error_detail(err: &RpcError) -> String {
    match err {
        RpcError::Function { kind } => kind.to_string(),
        RpcError::Protocol { kind } => kind.to_string(),
        RpcError::InvalidRequest { message } => message.clone(),
        other => other.to_string(),
    }
}
