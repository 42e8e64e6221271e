use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use http_body::Body as _;
use axum::http::{header, request::Parts, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde_json::Value;

use logwire::{wire::HttpRequest, Level, LogRecord, Logger, SpanContext};

use crate::options::MiddlewareOptions;
use crate::recover::{log_panic, panic_to_error, request_id, request_info};
use crate::scope::RequestScope;
use crate::status::RpcStatus;

/// Shared state for the HTTP middleware pair.
#[derive(Clone)]
pub struct HttpLogState {
    pub(crate) logger: Arc<Logger>,
    pub(crate) options: MiddlewareOptions,
}

impl HttpLogState {
    pub fn new(logger: Arc<Logger>, options: MiddlewareOptions) -> Self {
        Self { logger, options }
    }
}

fn header_str(parts: &Parts, name: header::HeaderName) -> String {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// The second-from-last forwarded-for entry is the client address the load
/// balancer vouches for; anything earlier is client-supplied and anything
/// later is infrastructure. With fewer than two entries, fall back to the
/// observed peer, else a sentinel unroutable address.
fn remote_ip(forwarded: &str, parts: &Parts) -> String {
    let entries: Vec<&str> = forwarded.split(',').collect();
    if entries.len() >= 2 {
        return entries[entries.len() - 2].trim().to_string();
    }
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    "0.0.0.0".to_string()
}

fn response_size(response: &Response) -> String {
    if let Some(exact) = response.body().size_hint().exact() {
        return exact.to_string();
    }
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("0")
        .to_string()
}

/// Request logging middleware: installs a [`RequestScope`] for the handler,
/// then emits exactly one summary record once the response is ready, subject
/// to the configured filter.
pub async fn log_requests(
    State(state): State<HttpLogState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let span = parts
        .headers
        .get("x-cloud-trace-context")
        .and_then(|value| value.to_str().ok())
        .and_then(SpanContext::from_cloud_header);
    let scope = RequestScope::new(state.logger.clone(), span);

    let forwarded = header_str(&parts, header::HeaderName::from_static("x-forwarded-for"));
    scope.add_field("forwardIP", Value::String(forwarded.clone()));

    let mut details = HttpRequest {
        request_method: parts.method.to_string(),
        request_url: parts.uri.to_string(),
        remote_ip: remote_ip(&forwarded, &parts),
        referer: header_str(&parts, header::REFERER),
        user_agent: header_str(&parts, header::USER_AGENT),
        request_size: header_str(&parts, header::CONTENT_LENGTH),
        protocol: format!("{:?}", parts.version),
        ..Default::default()
    };
    if details.request_size.is_empty() {
        details.request_size = "0".to_string();
    }

    let should_log = (state.options.filter_http)(&parts);
    let method = parts.method.clone();
    let uri = parts.uri.clone();

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(scope.clone());

    let response = next.run(request).await;

    details.status = response.status().as_u16().to_string();
    details.latency = format!("{:.5}s", start.elapsed().as_secs_f64());
    details.response_size = response_size(&response);

    if should_log {
        scope.log(
            LogRecord::new(Level::Info, format!("served HTTP {method} {uri}"))
                .with_http_request(details),
        );
    }

    response
}

/// Panic recovery middleware: converts a handler panic into one ERROR record
/// (stack captured at recovery time) plus a client-safe JSON response
/// carrying a correlation id. Chain inside [`log_requests`] so the summary
/// still sees the 500.
pub async fn recover_panics(request: Request, next: Next) -> Response {
    let scope = request.extensions().get::<RequestScope>().cloned();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let err = panic_to_error(payload);
            let id = request_id();
            log_panic(scope.as_ref(), err, &id);
            panic_response(scope.as_ref(), &id)
        }
    }
}

fn panic_response(scope: Option<&RequestScope>, request_id: &str) -> Response {
    let status = RpcStatus {
        code: tonic::Code::Internal as i32,
        message: "server error".to_string(),
        details: vec![request_info(request_id)],
    };

    let body = match serde_json::to_vec(&status) {
        Ok(body) => body,
        Err(err) => {
            // The client still deserves JSON even when we cannot say much.
            match scope {
                Some(scope) => scope.log(
                    LogRecord::new(Level::Error, "error marshalling error status into log")
                        .with_error(err),
                ),
                None => tracing::error!(error = %err, "error marshalling error status into log"),
            }
            br#"{"error": "server_error"}"#.to_vec()
        }
    };

    axum::http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
