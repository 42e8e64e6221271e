mod assemble;

use regex::Regex;
use uuid::Uuid;

use crate::logger::FormatError;
use crate::record::LogRecord;
use crate::wire::SourceReference;

/// Where a stack trace ends up on the wire: appended to the message, in the
/// dedicated payload field, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackStyle {
    #[default]
    InMessage,
    InPayload,
    Both,
}

/// Frames from these are never the interesting origin of an error.
const DEFAULT_STACK_SKIP: &[&str] = &[
    "backtrace",
    "logwire",
    "tracing",
    "tokio",
    "tonic",
    "std::panicking",
];

/// Formatting configuration plus the process-wide fallback trace id.
/// Constructed once, immutable afterwards, shared read-only across requests.
#[derive(Debug, Clone)]
pub struct Formatter {
    pub(crate) service: String,
    pub(crate) version: String,
    pub(crate) project_id: String,
    pub(crate) stack_skip: Vec<String>,
    pub(crate) skip_regex: Option<Regex>,
    pub(crate) skip_timestamp: bool,
    pub(crate) stack_style: StackStyle,
    pub(crate) pretty_print: bool,
    pub(crate) source_references: Vec<SourceReference>,
    pub(crate) global_trace_id: String,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self {
            service: String::new(),
            version: String::new(),
            project_id: String::new(),
            stack_skip: DEFAULT_STACK_SKIP.iter().map(|s| s.to_string()).collect(),
            skip_regex: None,
            skip_timestamp: false,
            stack_style: StackStyle::default(),
            pretty_print: false,
            source_references: Vec::new(),
            // Groups otherwise-uncorrelated lines from this process under
            // one identifier for the process lifetime.
            global_trace_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Service name used for error reporting.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Service version used for error reporting.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Backend project all entries are addressed under.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Add a substring pattern excluded from error-origin resolution.
    pub fn with_stack_skip(mut self, pattern: impl Into<String>) -> Self {
        self.stack_skip.push(pattern.into());
        self
    }

    /// Exclude functions matching this pattern from error-origin resolution.
    pub fn with_regex_skip(mut self, regex: Regex) -> Self {
        self.skip_regex = Some(regex);
        self
    }

    /// Leave the timestamp to the ingestion side.
    pub fn with_skip_timestamp(mut self) -> Self {
        self.skip_timestamp = true;
        self
    }

    pub fn with_stack_style(mut self, style: StackStyle) -> Self {
        self.stack_style = style;
        self
    }

    pub fn with_pretty_print(mut self) -> Self {
        self.pretty_print = true;
        self
    }

    /// Add a reference to the source snapshot this build came from.
    pub fn with_source_reference(
        mut self,
        repository: impl Into<String>,
        revision_id: impl Into<String>,
    ) -> Self {
        self.source_references.push(SourceReference {
            repository: repository.into(),
            revision_id: revision_id.into(),
        });
        self
    }

    /// Override the generated fallback trace id.
    pub fn with_global_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.global_trace_id = trace_id.into();
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Serialize one record as a newline-terminated JSON entry.
    pub fn format(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let entry = self.to_entry(record);
        let mut buf = if self.pretty_print {
            serde_json::to_vec_pretty(&entry)?
        } else {
            serde_json::to_vec(&entry)?
        };
        buf.push(b'\n');
        Ok(buf)
    }
}
