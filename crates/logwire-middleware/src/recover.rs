use std::any::Any;

use serde_json::{json, Value};
use uuid::Uuid;

use logwire::{capture_stack, BoxError, Level, LogRecord};

use crate::scope::RequestScope;

/// Normalize a recovered panic payload into an error value.
pub(crate) fn panic_to_error(payload: Box<dyn Any + Send>) -> BoxError {
    match payload.downcast::<String>() {
        Ok(text) => (*text).into(),
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(text) => (*text).into(),
            Err(_) => "unknown panic value".into(),
        },
    }
}

/// Fresh correlation id shared between the error record and the client
/// response, so a client report can be matched to its log entry.
pub(crate) fn request_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn request_info(request_id: &str) -> Value {
    json!({ "requestId": request_id })
}

/// Log a recovered panic: one ERROR record with the stack captured here and
/// now, before the frames unwind away. Without a scope the diagnostic still
/// goes somewhere, just without request context.
pub(crate) fn log_panic(scope: Option<&RequestScope>, err: BoxError, request_id: &str) {
    let stack = capture_stack();
    match scope {
        Some(scope) => scope.log(
            LogRecord::new(Level::Error, "panic handling request")
                .with_error(err)
                .with_field("stackTrace", Value::String(stack))
                .with_field("requestId", Value::String(request_id.to_string())),
        ),
        None => tracing::error!(error = %err, request_id, "panic handling request"),
    }
}
