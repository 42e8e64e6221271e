use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::{FutureExt, Stream};
use serde_json::Value;

use logwire::{wire::GrpcRequest, wire::HttpRequest, Level, LogRecord, Logger, SpanContext};
use tonic::{Code, Request, Response, Status};

use crate::options::MiddlewareOptions;
use crate::recover::{log_panic, panic_to_error, request_id, request_info};
use crate::scope::RequestScope;
use crate::status::{code_to_http, RpcStatus};

/// Logging wrappers for unary and streaming RPC handlers. Chain these at the
/// very top of the request scope so handler records see the scope.
#[derive(Clone)]
pub struct RpcLogging {
    logger: Arc<Logger>,
    options: MiddlewareOptions,
}

impl RpcLogging {
    pub fn new(logger: Arc<Logger>, options: MiddlewareOptions) -> Self {
        Self { logger, options }
    }

    /// Wrap a unary handler: scoped context in, one summary line out.
    pub async fn unary<T, U, F, Fut>(
        &self,
        full_method: &str,
        mut request: Request<T>,
        handler: F,
    ) -> Result<Response<U>, Status>
    where
        F: FnOnce(Request<T>) -> Fut,
        Fut: Future<Output = Result<Response<U>, Status>>,
    {
        let start = Instant::now();
        let (scope, mut details) = self.open_scope(full_method, &request);
        request.extensions_mut().insert(scope.clone());

        let result = handler(request).await;

        details.duration = format!("{:.5}s", start.elapsed().as_secs_f64());
        scope.add_field("grpcRequest", grpc_request_value(&details));
        self.finish(&scope, full_method, &details, result.as_ref().err());

        result
    }

    /// Wrap a streaming handler. The summary is emitted once the response
    /// stream is dropped, covering the whole life of the stream whatever
    /// ended it.
    pub async fn streaming<T, M, S, F, Fut>(
        &self,
        full_method: &str,
        mut request: Request<T>,
        handler: F,
    ) -> Result<Response<LoggedStream<S>>, Status>
    where
        S: Stream<Item = Result<M, Status>> + Unpin,
        F: FnOnce(Request<T>) -> Fut,
        Fut: Future<Output = Result<Response<S>, Status>>,
    {
        let start = Instant::now();
        let (scope, mut details) = self.open_scope(full_method, &request);
        request.extensions_mut().insert(scope.clone());

        match handler(request).await {
            Ok(response) => {
                let (metadata, inner, extensions) = response.into_parts();
                let logged = LoggedStream {
                    inner,
                    summary: Some(Summary {
                        logging: self.clone(),
                        scope,
                        full_method: full_method.to_string(),
                        details,
                        start,
                        error: None,
                    }),
                };
                Ok(Response::from_parts(metadata, logged, extensions))
            }
            Err(status) => {
                details.duration = format!("{:.5}s", start.elapsed().as_secs_f64());
                scope.add_field("grpcRequest", grpc_request_value(&details));
                self.finish(&scope, full_method, &details, Some(&status));
                Err(status)
            }
        }
    }

    fn open_scope<T>(&self, full_method: &str, request: &Request<T>) -> (RequestScope, GrpcRequest) {
        let metadata = request.metadata();
        let span = metadata
            .get("x-cloud-trace-context")
            .and_then(|value| value.to_str().ok())
            .and_then(SpanContext::from_cloud_header);
        let scope = RequestScope::new(self.logger.clone(), span);

        let mut details = GrpcRequest {
            method: full_method.to_string(),
            ..Default::default()
        };
        if let Some(agent) = metadata.get("user-agent").and_then(|value| value.to_str().ok()) {
            details.user_agent = agent.to_string();
        }
        if let Some(timeout) = metadata.get("grpc-timeout").and_then(|value| value.to_str().ok()) {
            details.deadline = timeout.to_string();
        }
        if let Some(addr) = request.remote_addr() {
            details.peer_addr = format!("tcp://{addr}");
        }

        // visible to handler-time records; refreshed with the duration later
        scope.add_field("grpcRequest", grpc_request_value(&details));

        (scope, details)
    }

    /// One summary line per RPC: filter, then error handling, then the
    /// HTTP-shaped INFO record the log view renders like load-balancer
    /// traffic.
    fn finish(
        &self,
        scope: &RequestScope,
        full_method: &str,
        details: &GrpcRequest,
        err: Option<&Status>,
    ) {
        if !(self.options.filter_rpc)(full_method, err) {
            return;
        }
        if self.handle_error(scope, full_method, err) {
            return;
        }

        let code = err.map(Status::code).unwrap_or(Code::Ok);
        let summary = HttpRequest {
            request_method: "POST".to_string(),
            request_url: full_method.to_string(),
            user_agent: details.user_agent.clone(),
            latency: details.duration.clone(),
            remote_ip: details.peer_addr.clone(),
            protocol: "gRPC".to_string(),
            status: code_to_http(code).to_string(),
            ..Default::default()
        };

        scope.log(
            LogRecord::new(Level::Info, format!("served RPC {full_method}"))
                .with_http_request(summary),
        );
    }

    /// Serialize the RPC status into the scope. Internal errors always log
    /// at ERROR; other errors may be claimed by the custom hook. Returns
    /// true when the summary line should be skipped.
    fn handle_error(&self, scope: &RequestScope, full_method: &str, err: Option<&Status>) -> bool {
        let Some(status) = err else {
            return false;
        };

        match serde_json::to_value(RpcStatus::from_status(status)) {
            Ok(value) => scope.add_field("grpcStatus", value),
            Err(marshal_err) => {
                // should never happen; logged so a missing grpcStatus can be
                // explained
                scope.log(
                    LogRecord::new(Level::Warn, "error marshalling error status into log")
                        .with_error(marshal_err),
                );
                return false;
            }
        }

        if status.code() == Code::Internal {
            scope.log(
                LogRecord::new(
                    Level::Error,
                    format!("internal error response on RPC {full_method}"),
                )
                .with_error(status.clone()),
            );
            return true;
        }

        (self.options.error_hook)(scope, status, full_method)
    }
}

fn grpc_request_value(details: &GrpcRequest) -> Value {
    serde_json::to_value(details).unwrap_or(Value::Null)
}

struct Summary {
    logging: RpcLogging,
    scope: RequestScope,
    full_method: String,
    details: GrpcRequest,
    start: Instant,
    error: Option<Status>,
}

/// A response stream that remembers the last error it yielded and emits the
/// RPC summary when dropped.
pub struct LoggedStream<S> {
    inner: S,
    summary: Option<Summary>,
}

impl<M, S> Stream for LoggedStream<S>
where
    S: Stream<Item = Result<M, Status>> + Unpin,
{
    type Item = Result<M, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Err(status))) = &next {
            if let Some(summary) = &mut this.summary {
                summary.error = Some(status.clone());
            }
        }
        next
    }
}

impl<S> Drop for LoggedStream<S> {
    fn drop(&mut self) {
        if let Some(mut summary) = self.summary.take() {
            summary.details.duration = format!("{:.5}s", summary.start.elapsed().as_secs_f64());
            summary
                .scope
                .add_field("grpcRequest", grpc_request_value(&summary.details));
            summary.logging.finish(
                &summary.scope,
                &summary.full_method,
                &summary.details,
                summary.error.as_ref(),
            );
        }
    }
}

/// Recover panics from a unary handler, returning a client-safe internal
/// error whose details carry a correlation id.
pub async fn recover_unary<T, U, F, Fut>(
    request: Request<T>,
    handler: F,
) -> Result<Response<U>, Status>
where
    F: FnOnce(Request<T>) -> Fut,
    Fut: Future<Output = Result<Response<U>, Status>>,
{
    let scope = request.extensions().get::<RequestScope>().cloned();
    match AssertUnwindSafe(handler(request)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(recovered_status(scope.as_ref(), payload)),
    }
}

/// Recover panics from a streaming handler and from polls of the stream it
/// returns; a mid-stream panic becomes a terminal error item.
pub async fn recover_streaming<T, M, S, F, Fut>(
    request: Request<T>,
    handler: F,
) -> Result<Response<RecoveredStream<S>>, Status>
where
    S: Stream<Item = Result<M, Status>> + Unpin,
    F: FnOnce(Request<T>) -> Fut,
    Fut: Future<Output = Result<Response<S>, Status>>,
{
    let scope = request.extensions().get::<RequestScope>().cloned();
    match AssertUnwindSafe(handler(request)).catch_unwind().await {
        Ok(Ok(response)) => {
            let (metadata, inner, extensions) = response.into_parts();
            let recovered = RecoveredStream {
                inner,
                scope,
                done: false,
            };
            Ok(Response::from_parts(metadata, recovered, extensions))
        }
        Ok(Err(status)) => Err(status),
        Err(payload) => Err(recovered_status(scope.as_ref(), payload)),
    }
}

/// A response stream whose polls are panic-safe.
pub struct RecoveredStream<S> {
    inner: S,
    scope: Option<RequestScope>,
    done: bool,
}

impl<M, S> Stream for RecoveredStream<S>
where
    S: Stream<Item = Result<M, Status>> + Unpin,
{
    type Item = Result<M, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match catch_unwind(AssertUnwindSafe(|| Pin::new(&mut this.inner).poll_next(cx))) {
            Ok(next) => next,
            Err(payload) => {
                this.done = true;
                Poll::Ready(Some(Err(recovered_status(this.scope.as_ref(), payload))))
            }
        }
    }
}

fn recovered_status(scope: Option<&RequestScope>, payload: Box<dyn Any + Send>) -> Status {
    let err = panic_to_error(payload);
    let id = request_id();
    log_panic(scope, err, &id);

    match serde_json::to_vec(&vec![request_info(&id)]) {
        Ok(bytes) => Status::with_details(Code::Internal, "server error", Bytes::from(bytes)),
        Err(marshal_err) => {
            match scope {
                Some(scope) => scope.log(
                    LogRecord::new(Level::Error, "error marshalling error status into log")
                        .with_error(marshal_err),
                ),
                None => {
                    tracing::error!(error = %marshal_err, "error marshalling error status into log")
                }
            }
            Status::internal("server error")
        }
    }
}
