//! Wire protocol module.
//!
//! Defines the request envelope, the tagged response, the JSON codec, and
//! the connection-lifecycle framing shared by client and server.
//!
//! ## Wire Format
//!
//! One UTF-8 JSON object per direction, no length prefix, no delimiter:
//! ```text
//! client -> server: {"package": "...", "function": "...", "args": ["...", ...]}  then half-close
//! server -> client: {...} or {"error": "..."}                                     then close
//! ```
//!
//! Each side treats end-of-stream as end-of-message. Writing anything after
//! the half-close breaks this framing.

mod codec;
mod request;
mod response;
mod wire;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use request::Request;
pub use response::{Response, ERROR_KEY};
pub use wire::{discard_to_close, read_to_close, read_to_close_with_timeout, write_and_half_close};
