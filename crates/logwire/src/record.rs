use std::collections::BTreeMap;
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::severity::Level;
use crate::trace::SpanContext;
use crate::wire::HttpRequest;

/// Boxed error payload attached to a record.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The frame a record was emitted from, when the logging framework captured
/// it at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// One structured log call. Created per emission, consumed immediately by
/// the entry assembler, never persisted.
#[derive(Debug)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    /// Creation time; resolution time is used when absent.
    pub time: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, Value>,
    pub error: Option<BoxError>,
    pub caller: Option<Caller>,
    pub span: Option<SpanContext>,
    /// Request details destined for the entry root, where the backend
    /// renders them as the summary line. Set by the request middleware.
    pub http_request: Option<HttpRequest>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            time: None,
            fields: BTreeMap::new(),
            error: None,
            caller: None,
            span: None,
            http_request: None,
        }
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<BoxError>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_caller(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> Self {
        self.caller = Some(Caller {
            file: file.into(),
            line,
            function: function.into(),
        });
        self
    }

    pub fn with_span(mut self, span: SpanContext) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_http_request(mut self, request: HttpRequest) -> Self {
        self.http_request = Some(request);
        self
    }
}
