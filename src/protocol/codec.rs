//! JSON codec for request and response bodies.
//!
//! No schema validation happens here beyond "is a JSON object" on the
//! response side; which keys a function returns is the caller's business.

use serde_json::Value;

use crate::error::{ProtocolErrorKind, RpcError, RpcResult};

use super::request::Request;
use super::response::Response;

/// Serialize a request to UTF-8 JSON.
///
/// Output is deterministic: keys are written as `package`, `function`, `args`.
pub fn encode_request(request: &Request) -> RpcResult<Vec<u8>> {
    request.validate()?;
    Ok(serde_json::to_vec(request)?)
}

/// Parse response bytes.
///
/// Anything that is not a single JSON object, including empty input, is
/// [`RpcError::MalformedResponse`].
pub fn decode_response(bytes: &[u8]) -> RpcResult<Response> {
    if bytes.is_empty() {
        return Err(RpcError::malformed("empty response"));
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| RpcError::malformed(format!("invalid JSON: {} (raw: {})", e, preview(bytes))))?;

    match value {
        Value::Object(map) => Ok(Response::from_map(map)),
        other => Err(RpcError::malformed(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
    }
}

/// Parse a request on the server side.
pub fn decode_request(bytes: &[u8]) -> RpcResult<Request> {
    let request: Request = serde_json::from_slice(bytes).map_err(|e| RpcError::Protocol {
        kind: ProtocolErrorKind::InvalidMessageFormat {
            message: format!("Invalid JSON: {}", e),
        },
    })?;
    request.validate()?;
    Ok(request)
}

/// Serialize a response to UTF-8 JSON.
pub fn encode_response(response: &Response) -> RpcResult<Vec<u8>> {
    Ok(serde_json::to_vec(&response.to_map())?)
}

/// First bytes of a payload, for error messages.
fn preview(bytes: &[u8]) -> String {
    const MAX_PREVIEW: usize = 200;
    let end = bytes.len().min(MAX_PREVIEW);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if bytes.len() > MAX_PREVIEW {
        text.push_str("...");
    }
    text
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
