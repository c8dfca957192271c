//! RPC client.
//!
//! One call per connection: connect, write the request, half-close, read
//! until the daemon closes, decode. Nothing is pooled, cached, or retried.

mod blocking;
mod rpc;
mod types;

pub use blocking::BlockingClient;
pub use rpc::RpcClient;
pub use types::{ByakuganOutput, RunOutput, SkillCheck, SkillsCount, VersionInfo};
