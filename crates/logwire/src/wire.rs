use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::severity::Severity;

/// Entries carrying this type are treated by the backend's error-aggregation
/// pipeline as discrete error occurrences with all required fields present.
pub const REPORTED_ERROR_EVENT_TYPE: &str =
    "type.googleapis.com/google.devtools.clouderrorreporting.v1beta1.ReportedErrorEvent";

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Name and version of the service an error report belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceContext {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Where a log entry was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub line: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub function: String,
}

/// The same location data under the error-report field names; the two
/// consumers want identical content with different spellings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocation {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_path: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub line_number: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub function_name: String,
}

/// A snapshot of the source tree an application was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub revision_id: String,
}

/// Request and response details in the shape the log backend renders
/// natively, with latency and status in the summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HttpRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_size: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_size: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub server_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub referer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latency: String,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_lookup: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_validated_with_origin_server: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cache_fill_bytes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

/// Details of an RPC request and response appended to a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GrpcRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(rename = "peer", skip_serializing_if = "String::is_empty")]
    pub peer_addr: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deadline: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub duration: String,
}

/// Per-entry context: the residual field map plus the promoted sub-objects.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_location: Option<ReportLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_sub_request: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc_request: Option<GrpcRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc_status: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_references: Vec<SourceReference>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
            && self.user.is_empty()
            && self.report_location.is_none()
            && self.http_request.is_none()
            && self.pub_sub_request.is_none()
            && self.grpc_request.is_none()
            && self.grpc_status.is_none()
            && self.source_references.is_empty()
    }
}

/// One wire-format log entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Entry {
    #[serde(rename = "@type", skip_serializing_if = "String::is_empty")]
    pub entry_type: String,
    #[serde(rename = "logName", skip_serializing_if = "String::is_empty")]
    pub log_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "serviceContext", skip_serializing_if = "Option::is_none")]
    pub service_context: Option<ServiceContext>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(
        rename = "logging.googleapis.com/sourceLocation",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_location: Option<SourceLocation>,
    #[serde(rename = "stack_trace", skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,
    #[serde(rename = "logging.googleapis.com/trace", skip_serializing_if = "String::is_empty")]
    pub trace: String,
    #[serde(rename = "logging.googleapis.com/spanId", skip_serializing_if = "String::is_empty")]
    pub span_id: String,
    #[serde(rename = "logging.googleapis.com/trace_sampled", skip_serializing_if = "is_false")]
    pub trace_sampled: bool,
    #[serde(rename = "httpRequest", skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_fields_are_omitted() {
        let entry = Entry {
            message: "hello".to_string(),
            severity: Some(Severity::Info),
            ..Default::default()
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"message": "hello", "severity": "INFO"}));
    }

    #[test]
    fn test_http_request_wire_names() {
        let request = HttpRequest {
            request_method: "GET".to_string(),
            remote_ip: "10.0.0.1".to_string(),
            latency: "0.00321s".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"requestMethod": "GET", "remoteIp": "10.0.0.1", "latency": "0.00321s"})
        );
    }

    #[test]
    fn test_grpc_request_peer_spelling() {
        let request = GrpcRequest {
            method: "/svc/Do".to_string(),
            peer_addr: "tcp://10.0.0.2:443".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"method": "/svc/Do", "peer": "tcp://10.0.0.2:443"}));
    }

    #[test]
    fn test_context_empty_check() {
        let mut context = Context::default();
        assert!(context.is_empty());
        context.user = "someone".to_string();
        assert!(!context.is_empty());
    }
}
