use serde::{Deserialize, Serialize};
use serde_json::Value;
use tonic::{Code, Status};

/// The RPC status in its JSON projection. Logged under `grpcStatus` and
/// reused verbatim as the panic-recovery response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub details: Vec<Value>,
}

impl RpcStatus {
    pub fn from_status(status: &Status) -> Self {
        Self {
            code: status.code() as i32,
            message: status.message().to_string(),
            details: Vec::new(),
        }
    }
}

/// HTTP-equivalent status codes for server-sent RPC codes, so the log view
/// renders RPC summaries with the same widgets as HTTP traffic. Only for
/// presentation, never returned to clients.
pub fn code_to_http(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::Cancelled => 408,
        Code::InvalidArgument => 400,
        Code::DeadlineExceeded => 504,
        Code::NotFound => 404,
        Code::AlreadyExists => 409,
        Code::PermissionDenied => 403,
        Code::ResourceExhausted => 429,
        Code::FailedPrecondition => 400,
        Code::Aborted => 409,
        Code::OutOfRange => 400,
        Code::Unimplemented => 501,
        Code::Internal => 500,
        Code::Unavailable => 503,
        Code::Unauthenticated => 401,
        _ => 500,
    }
}
