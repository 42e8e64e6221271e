use std::sync::Arc;

use axum::http::{header, request::Parts};
use tonic::Status;

use crate::scope::RequestScope;

/// Decides whether an HTTP request's summary line is logged at all.
pub type HttpFilter = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Decides whether an RPC's summary line is logged at all.
pub type RpcFilter = Arc<dyn Fn(&str, Option<&Status>) -> bool + Send + Sync>;

/// Invoked before an RPC error would be logged; returning `true` means the
/// error was already logged elsewhere and the summary line is suppressed.
pub type ErrorHook = Arc<dyn Fn(&RequestScope, &Status, &str) -> bool + Send + Sync>;

/// Process-wide middleware configuration: constructed once, read-only.
#[derive(Clone)]
pub struct MiddlewareOptions {
    pub(crate) filter_http: HttpFilter,
    pub(crate) filter_rpc: RpcFilter,
    pub(crate) error_hook: ErrorHook,
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            filter_http: Arc::new(default_http_filter),
            filter_rpc: Arc::new(default_rpc_filter),
            error_hook: Arc::new(|_, _, _| false),
        }
    }
}

impl MiddlewareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_filter(
        mut self,
        filter: impl Fn(&Parts) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter_http = Arc::new(filter);
        self
    }

    pub fn with_rpc_filter(
        mut self,
        filter: impl Fn(&str, Option<&Status>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter_rpc = Arc::new(filter);
        self
    }

    pub fn with_error_hook(
        mut self,
        hook: impl Fn(&RequestScope, &Status, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.error_hook = Arc::new(hook);
        self
    }
}

/// Health checks and monitoring canaries are liveness noise, not traffic.
pub fn default_http_filter(parts: &Parts) -> bool {
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if user_agent == "Envoy/HC"
        || user_agent.starts_with("kube-probe/")
        || user_agent.starts_with("GoogleHC/")
        || user_agent.starts_with("GoogleStackdriverMonitoring")
    {
        return false;
    }

    !parts.uri.path().starts_with("/health")
}

/// Standard health and reflection probes on the RPC side.
pub fn default_rpc_filter(full_method: &str, _err: Option<&Status>) -> bool {
    !(full_method.starts_with("/grpc.health") || full_method.starts_with("/grpc.reflection"))
}
