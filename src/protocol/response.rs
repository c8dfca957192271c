//! Response type for the protocol.

use serde_json::{Map, Value};

use crate::error::{RpcError, RpcResult};

/// Key whose presence marks an error response.
pub const ERROR_KEY: &str = "error";

/// A decoded response.
///
/// On the wire both shapes are plain JSON objects; the presence of the
/// `error` key is the only discriminant, regardless of any other keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Any object without an `error` key. Keys are a per-function contract.
    Success(Map<String, Value>),

    /// The object carried an `error` key.
    Failure { detail: String },
}

impl Response {
    /// Classify a JSON object.
    ///
    /// A non-string `error` value is kept as its JSON text.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        match map.remove(ERROR_KEY) {
            Some(Value::String(detail)) => Response::Failure { detail },
            Some(other) => Response::Failure {
                detail: other.to_string(),
            },
            None => Response::Success(map),
        }
    }

    /// Create a success response from a JSON value.
    ///
    /// Non-object values are wrapped as `{"result": value}`.
    pub fn success(data: Value) -> Self {
        match data {
            Value::Object(map) => Self::from_map(map),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                Response::Success(map)
            }
        }
    }

    /// Create an error response.
    pub fn failure(detail: impl Into<String>) -> Self {
        Response::Failure {
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// The object this response is written as.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            Response::Success(map) => map.clone(),
            Response::Failure { detail } => {
                let mut map = Map::new();
                map.insert(ERROR_KEY.to_string(), Value::String(detail.clone()));
                map
            }
        }
    }

    /// Turn a failure into [`RpcError::Remote`].
    pub fn into_result(self) -> RpcResult<Map<String, Value>> {
        match self {
            Response::Success(map) => Ok(map),
            Response::Failure { detail } => Err(RpcError::Remote { detail }),
        }
    }
}
