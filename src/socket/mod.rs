//! Reference Unix socket server.
//!
//! Accepts connections, reads one request per connection, dispatches it to
//! a [`FunctionRegistry`](crate::functions::FunctionRegistry), writes one
//! response and closes. Exists so the client can be tested against the
//! real protocol; production daemons live elsewhere.

mod connection;
mod listener;

pub use connection::handle_connection;
pub use listener::{ConnectionMetrics, SocketListener};
