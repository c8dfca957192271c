//! Server-side function dispatch.
//!
//! Maps the `function` name of a request to a handler. Used by the
//! reference server; a real daemon plugs its own functions in here.

mod builtin;
mod registry;
mod traits;

pub use builtin::{PingFunction, VersionFunction};
pub use registry::{FnFunction, FunctionRegistry};
pub use traits::{CallContext, RemoteFunction};
