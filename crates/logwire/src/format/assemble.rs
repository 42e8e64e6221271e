use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::record::LogRecord;
use crate::severity::Severity;
use crate::stack::{render_error_stack, resolve_origin};
use crate::wire::{
    Context, Entry, GrpcRequest, HttpRequest, ReportLocation, ServiceContext, SourceLocation,
    REPORTED_ERROR_EVENT_TYPE,
};

use super::{Formatter, StackStyle};

/// Deserialize-and-remove a residual field when its shape matches `T`.
/// Anything else is left where it was; a mismatch is not an error.
fn take_shaped<T: DeserializeOwned>(data: &mut Map<String, Value>, key: &str) -> Option<T> {
    let candidate = data.get(key)?;
    let object = candidate.as_object()?;
    if object.is_empty() {
        return None;
    }
    let parsed: T = serde_json::from_value(candidate.clone()).ok()?;
    data.remove(key);
    Some(parsed)
}

impl Formatter {
    /// Transform one record into its wire entry. Never fails: malformed or
    /// mistyped fields stay in the residual data map so the raw data still
    /// ships.
    pub fn to_entry(&self, record: &LogRecord) -> Entry {
        let severity = record.level.severity();
        let mut message: Vec<String> = Vec::new();
        let mut context = Context::default();

        // Residual field map. The attached error is mirrored in as a string
        // up front; a JSON encoder would otherwise drop it silently.
        context.data = record
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(err) = &record.error {
            context
                .data
                .insert("error".to_string(), Value::String(err.to_string()));
        }

        let mut entry = Entry {
            severity,
            ..Default::default()
        };

        // Correlate to the active trace, else the process-wide fallback so
        // unrelated lines from one process still share a key.
        if let Some(span) = record.span.filter(|span| span.is_valid()) {
            entry.trace = format!(
                "projects/{}/traces/{}",
                self.project_id,
                span.trace_id_hex()
            );
            entry.span_id = span.span_id_hex();
            entry.trace_sampled = span.is_sampled();
        }
        if entry.trace.is_empty() {
            entry.trace = format!("projects/{}/traces/{}", self.project_id, self.global_trace_id);
        }

        entry.log_name = match context.data.get("logID").and_then(Value::as_str) {
            Some(log_id) => format!(
                "projects/{}/logs/{}%2F{}",
                self.project_id, self.service, log_id
            ),
            None => format!("projects/{}/logs/{}", self.project_id, self.service),
        };

        if !record.message.is_empty() {
            message.push(record.message.clone());
        }

        if !self.skip_timestamp {
            let time = record.time.unwrap_or_else(Utc::now);
            entry.timestamp = time.to_rfc3339_opts(SecondsFormat::Nanos, true);
        }

        // Prefer the caller the logging framework recorded at call time;
        // only then walk the stack ourselves.
        entry.source_location = match &record.caller {
            Some(caller) => Some(SourceLocation {
                file: caller.file.clone(),
                line: caller.line,
                function: caller.function.clone(),
            }),
            None => {
                resolve_origin(&self.stack_skip, self.skip_regex.as_ref()).map(|frame| {
                    SourceLocation {
                        file: frame.file,
                        line: frame.line,
                        function: frame.function,
                    }
                })
            }
        };

        if severity.map(Severity::is_error).unwrap_or(false) {
            entry.service_context = Some(ServiceContext {
                service: self.service.clone(),
                version: self.version.clone(),
            });

            if !self.source_references.is_empty() {
                context.source_references = self.source_references.clone();
            }

            // The report consumer wants the same location under its own
            // field names.
            if let Some(location) = &entry.source_location {
                context.report_location = Some(ReportLocation {
                    file_path: location.file.clone(),
                    line_number: location.line,
                    function_name: location.function.clone(),
                });
            }

            if let Some(err) = &record.error {
                let payload_trace =
                    matches!(self.stack_style, StackStyle::InPayload | StackStyle::Both);
                if payload_trace {
                    if let Some(trace) = render_error_stack(err.as_ref()) {
                        let mut stack = message.clone();
                        stack.push(trace);
                        entry.stack_trace = stack.join("\n");
                    }
                }

                // The aggregation pipeline reads the error from the message,
                // so promote it out of the residual map.
                message.push(err.to_string());
                context.data.remove("error");
            }

            // An explicitly supplied stack trace (a panic-recovery capture)
            // wins over anything derived from the error.
            if let Some(supplied) = context.data.remove("stackTrace") {
                let rendered = match supplied {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                // The first line of a trace is assumed to explain the error,
                // so the message parts lead.
                let mut stack = message.clone();
                stack.push(rendered);

                if matches!(self.stack_style, StackStyle::InMessage | StackStyle::Both) {
                    message = stack.clone();
                }
                if matches!(self.stack_style, StackStyle::InPayload | StackStyle::Both) {
                    entry.stack_trace = stack.join("\n");
                }
            }

            // Hard gate: the tag promises the aggregation pipeline that the
            // required fields are populated, so partial entries never carry it.
            let has_service = entry
                .service_context
                .as_ref()
                .map(|ctx| !ctx.service.is_empty())
                .unwrap_or(false);
            if !message.is_empty()
                && has_service
                && (!entry.stack_trace.is_empty() || entry.source_location.is_some())
            {
                entry.entry_type = REPORTED_ERROR_EVENT_TYPE.to_string();
            }
        }

        // A user id, email, or token naming the affected user.
        if let Some(user) = context.data.get("user") {
            let rendered = match user {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                _ => None,
            };
            if let Some(user) = rendered {
                context.user = user;
                context.data.remove("user");
            }
        }

        if let Some(request) = take_shaped::<HttpRequest>(&mut context.data, "httpRequest") {
            context.http_request = Some(request);
        }
        if let Some(request) = take_shaped::<GrpcRequest>(&mut context.data, "grpcRequest") {
            context.grpc_request = Some(request);
        }
        if context
            .data
            .get("grpcStatus")
            .map(Value::is_object)
            .unwrap_or(false)
        {
            context.grpc_status = context.data.remove("grpcStatus");
        }
        if let Some(Value::Object(request)) = context.data.get("pubSubRequest") {
            let request = request.clone();
            context.data.remove("pubSubRequest");
            context.pub_sub_request = Some(request);
        }

        // Summary request details from the middleware land at the entry root.
        if let Some(request) = &record.http_request {
            entry.http_request = Some(request.clone());
        }

        entry.message = message.join("\n");
        if !context.is_empty() {
            entry.context = Some(context);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use crate::severity::Level;
    use crate::stack::TracedError;
    use crate::trace::SpanContext;
    use chrono::DateTime;
    use serde_json::json;

    const TRACE_HEX: &str = "105445aa7843bc8bf206b12000100000";

    fn formatter() -> Formatter {
        Formatter::new()
            .with_project_id("test-project")
            .with_service("test")
            .with_version("0.1")
            .with_skip_timestamp()
            .with_source_reference("https://github.com/acme/test.git", "v1.2.3")
            .with_global_trace_id(TRACE_HEX)
    }

    fn span() -> SpanContext {
        let mut trace_id = [0u8; 16];
        trace_id.copy_from_slice(&hex::decode(TRACE_HEX).unwrap());
        SpanContext::new(trace_id, [0, 0, 0, 0, 0, 0, 0, 1], true)
    }

    fn record(level: Level) -> LogRecord {
        LogRecord::new(level, "my log entry")
            .with_field("foo", "bar")
            .with_span(span())
            .with_caller("src/server.rs", 42, "server::handle")
    }

    fn entry_json(record: &LogRecord) -> Value {
        serde_json::to_value(formatter().to_entry(record)).unwrap()
    }

    #[test]
    fn test_info_entry() {
        assert_eq!(
            entry_json(&record(Level::Info)),
            json!({
                "severity": "INFO",
                "message": "my log entry",
                "logName": "projects/test-project/logs/test",
                "logging.googleapis.com/trace":
                    "projects/test-project/traces/105445aa7843bc8bf206b12000100000",
                "logging.googleapis.com/spanId": "0000000000000001",
                "logging.googleapis.com/trace_sampled": true,
                "context": {"data": {"foo": "bar"}},
                "logging.googleapis.com/sourceLocation": {
                    "file": "src/server.rs",
                    "line": 42,
                    "function": "server::handle"
                },
            })
        );
    }

    #[test]
    fn test_error_entry_is_reportable() {
        assert_eq!(
            entry_json(&record(Level::Error)),
            json!({
                "@type": REPORTED_ERROR_EVENT_TYPE,
                "severity": "ERROR",
                "message": "my log entry",
                "logName": "projects/test-project/logs/test",
                "logging.googleapis.com/trace":
                    "projects/test-project/traces/105445aa7843bc8bf206b12000100000",
                "logging.googleapis.com/spanId": "0000000000000001",
                "logging.googleapis.com/trace_sampled": true,
                "serviceContext": {"service": "test", "version": "0.1"},
                "context": {
                    "data": {"foo": "bar"},
                    "reportLocation": {
                        "filePath": "src/server.rs",
                        "lineNumber": 42,
                        "functionName": "server::handle"
                    },
                    "sourceReferences": [{
                        "repository": "https://github.com/acme/test.git",
                        "revisionId": "v1.2.3"
                    }],
                },
                "logging.googleapis.com/sourceLocation": {
                    "file": "src/server.rs",
                    "line": 42,
                    "function": "server::handle"
                },
            })
        );
    }

    #[test]
    fn test_error_entry_promotes_attached_error_into_message() {
        let value = entry_json(&record(Level::Error).with_error("test error"));

        assert_eq!(value["message"], json!("my log entry\ntest error"));
        assert_eq!(value["serviceContext"], json!({"service": "test", "version": "0.1"}));
        assert_eq!(value["context"]["data"], json!({"foo": "bar"}));
    }

    #[test]
    fn test_info_entry_keeps_attached_error_in_data() {
        let value = entry_json(&record(Level::Info).with_error("test error"));

        assert_eq!(value["message"], json!("my log entry"));
        assert_eq!(value["context"]["data"]["error"], json!("test error"));
        assert!(value.get("serviceContext").is_none());
        assert!(value["context"].get("reportLocation").is_none());
    }

    #[test]
    fn test_supplied_stack_trace_styles() {
        let stack = "goroutine 1 [running]:\napp::main()\n\tsrc/main.rs:3 +0x1";

        let styled = |style: StackStyle| {
            let formatter = formatter().with_stack_style(style);
            let record = record(Level::Error).with_field("stackTrace", stack);
            serde_json::to_value(formatter.to_entry(&record)).unwrap()
        };

        let in_message = styled(StackStyle::InMessage);
        assert_eq!(
            in_message["message"],
            json!(format!("my log entry\n{stack}"))
        );
        assert!(in_message.get("stack_trace").is_none());

        let in_payload = styled(StackStyle::InPayload);
        assert_eq!(in_payload["message"], json!("my log entry"));
        assert_eq!(
            in_payload["stack_trace"],
            json!(format!("my log entry\n{stack}"))
        );

        let both = styled(StackStyle::Both);
        assert_eq!(both["message"], json!(format!("my log entry\n{stack}")));
        assert_eq!(both["stack_trace"], json!(format!("my log entry\n{stack}")));

        // the field is consumed regardless of placement
        for value in [in_message, in_payload, both] {
            assert!(value["context"]["data"].get("stackTrace").is_none());
        }
    }

    #[test]
    fn test_supplied_stack_trace_wins_over_error_stack() {
        let formatter = formatter().with_stack_style(StackStyle::InPayload);
        let record = record(Level::Error)
            .with_error(TracedError::new("boom"))
            .with_field("stackTrace", "explicit capture");
        let value = serde_json::to_value(formatter.to_entry(&record)).unwrap();

        let stack_trace = value["stack_trace"].as_str().unwrap();
        assert!(stack_trace.ends_with("explicit capture"));
        assert!(!stack_trace.contains("goroutine"));
    }

    #[test]
    fn test_error_stack_extracted_into_payload() {
        let formatter = formatter().with_stack_style(StackStyle::InPayload);
        let record = record(Level::Error).with_error(TracedError::new("boom"));
        let value = serde_json::to_value(formatter.to_entry(&record)).unwrap();

        let stack_trace = value["stack_trace"].as_str().unwrap();
        assert!(stack_trace.contains("boom\ngoroutine 1 [running]:"));
        // the error text still reaches the message
        assert_eq!(value["message"], json!("my log entry\nboom"));
    }

    #[test]
    fn test_reportable_gate_requires_service() {
        let formatter = Formatter::new()
            .with_project_id("test-project")
            .with_skip_timestamp();
        let value = serde_json::to_value(formatter.to_entry(&record(Level::Error))).unwrap();
        assert!(value.get("@type").is_none());
    }

    #[test]
    fn test_reportable_gate_requires_message() {
        let record = LogRecord::new(Level::Error, "").with_caller("src/a.rs", 1, "a");
        let value = entry_json(&record);
        assert!(value.get("@type").is_none());
    }

    #[test]
    fn test_reportable_gate_requires_stack_or_location() {
        // skip everything so resolution exhausts the stack
        let formatter = formatter().with_stack_skip("");
        let record = LogRecord::new(Level::Error, "my log entry");
        let value = serde_json::to_value(formatter.to_entry(&record)).unwrap();

        assert!(value.get("@type").is_none());
        assert!(value.get("logging.googleapis.com/sourceLocation").is_none());
        // location omission also suppresses the report location
        assert!(value["context"]["reportLocation"].is_null());
    }

    #[test]
    fn test_no_report_fields_below_error() {
        for level in [Level::Trace, Level::Debug, Level::Info, Level::Warn] {
            let value = entry_json(&record(level).with_error("test error"));
            assert!(value.get("serviceContext").is_none(), "{level:?}");
            assert!(value["context"].get("reportLocation").is_none(), "{level:?}");
            assert!(value.get("@type").is_none(), "{level:?}");
        }
    }

    #[test]
    fn test_fallback_trace_id() {
        let record = LogRecord::new(Level::Info, "hi").with_caller("src/a.rs", 1, "a");
        let value = entry_json(&record);
        assert_eq!(
            value["logging.googleapis.com/trace"],
            json!(format!("projects/test-project/traces/{TRACE_HEX}"))
        );
        assert!(value.get("logging.googleapis.com/spanId").is_none());
    }

    #[test]
    fn test_user_promotion() {
        let value = entry_json(&record(Level::Info).with_field("user", "alice@example.com"));
        assert_eq!(value["context"]["user"], json!("alice@example.com"));
        assert!(value["context"]["data"].get("user").is_none());

        let value = entry_json(&record(Level::Info).with_field("user", 1234));
        assert_eq!(value["context"]["user"], json!("1234"));

        // no textual rendering: stays put
        let value = entry_json(&record(Level::Info).with_field("user", json!({"id": 1})));
        assert!(value["context"].get("user").is_none());
        assert_eq!(value["context"]["data"]["user"], json!({"id": 1}));
    }

    #[test]
    fn test_http_request_shape_promotion() {
        let value = entry_json(
            &record(Level::Info).with_field("httpRequest", json!({"requestMethod": "GET"})),
        );
        assert_eq!(
            value["context"]["httpRequest"],
            json!({"requestMethod": "GET"})
        );
        assert!(value["context"]["data"].get("httpRequest").is_none());
    }

    #[test]
    fn test_mismatched_shape_stays_in_data() {
        let odd = json!({"requestMethod": "GET", "bogus": 1});
        let value = entry_json(&record(Level::Info).with_field("httpRequest", odd.clone()));
        assert!(value["context"].get("httpRequest").is_none());
        assert_eq!(value["context"]["data"]["httpRequest"], odd);

        // scalars do not masquerade as sub-objects either
        let value = entry_json(&record(Level::Info).with_field("grpcStatus", "broken"));
        assert!(value["context"].get("grpcStatus").is_none());
        assert_eq!(value["context"]["data"]["grpcStatus"], json!("broken"));
    }

    #[test]
    fn test_grpc_promotions() {
        let status = json!({"code": 13, "message": "server error"});
        let value = entry_json(
            &record(Level::Info)
                .with_field("grpcRequest", json!({"method": "/svc/Do", "duration": "0.5s"}))
                .with_field("grpcStatus", status.clone()),
        );
        assert_eq!(
            value["context"]["grpcRequest"],
            json!({"method": "/svc/Do", "duration": "0.5s"})
        );
        assert_eq!(value["context"]["grpcStatus"], status);
        assert!(value["context"]["data"].get("grpcRequest").is_none());
        assert!(value["context"]["data"].get("grpcStatus").is_none());
    }

    #[test]
    fn test_pub_sub_promotion_consumes_field() {
        let request = json!({"subscription": "projects/p/subscriptions/s"});
        let value = entry_json(&record(Level::Info).with_field("pubSubRequest", request.clone()));
        assert_eq!(value["context"]["pubSubRequest"], request);
        assert!(value["context"]["data"].get("pubSubRequest").is_none());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let record = record(Level::Error)
            .with_error("test error")
            .with_field("httpRequest", json!({"requestMethod": "GET"}))
            .with_field("user", "alice");
        let formatter = formatter();
        let first = serde_json::to_value(formatter.to_entry(&record)).unwrap();
        let second = serde_json::to_value(formatter.to_entry(&record)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_log_id_extends_log_name() {
        let value = entry_json(&record(Level::Info).with_field("logID", "worker"));
        assert_eq!(
            value["logName"],
            json!("projects/test-project/logs/test%2Fworker")
        );
        // consumed, not promoted: the raw field still ships
        assert_eq!(value["context"]["data"]["logID"], json!("worker"));
    }

    #[test]
    fn test_explicit_timestamp() {
        let time = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        let formatter = Formatter::new().with_project_id("p").with_service("s");
        let record = LogRecord::new(Level::Info, "hi")
            .with_time(time)
            .with_caller("src/a.rs", 1, "a");
        let value = serde_json::to_value(formatter.to_entry(&record)).unwrap();
        assert_eq!(value["timestamp"], json!("2023-11-14T22:13:20.500000000Z"));
    }

    #[test]
    fn test_timestamp_suppression() {
        let value = entry_json(&record(Level::Info));
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_missing_time_falls_back_to_resolution_time() {
        let formatter = Formatter::new().with_project_id("p").with_service("s");
        let record = LogRecord::new(Level::Info, "hi").with_caller("src/a.rs", 1, "a");
        let value = serde_json::to_value(formatter.to_entry(&record)).unwrap();
        let stamp = value["timestamp"].as_str().unwrap();
        assert!(stamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_trace_level_has_no_severity() {
        let value = entry_json(&record(Level::Trace));
        assert!(value.get("severity").is_none());
    }

    #[test]
    fn test_summary_request_reaches_entry_root() {
        let request = HttpRequest {
            request_method: "GET".to_string(),
            status: "200".to_string(),
            ..Default::default()
        };
        let value = entry_json(&record(Level::Info).with_http_request(request));
        assert_eq!(
            value["httpRequest"],
            json!({"requestMethod": "GET", "status": "200"})
        );
    }
}
