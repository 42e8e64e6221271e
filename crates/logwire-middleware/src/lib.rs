// Request-scoped instrumentation around the logwire record pipeline:
// HTTP and RPC summary logging plus panic recovery.

pub mod http;
pub mod options;
pub mod rpc;
pub mod scope;
pub mod status;

mod recover;
#[cfg(test)]
mod testutil;

pub use http::{log_requests, recover_panics, HttpLogState};
pub use options::{default_http_filter, default_rpc_filter, MiddlewareOptions};
pub use rpc::{recover_streaming, recover_unary, LoggedStream, RecoveredStream, RpcLogging};
pub use scope::RequestScope;
pub use status::{code_to_http, RpcStatus};
