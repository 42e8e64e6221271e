use std::io::{self, Write};
use std::sync::Mutex;

use thiserror::Error;

use crate::format::Formatter;
use crate::record::LogRecord;

/// Errors surfaced by the top-level formatting call. Callers drop or retry
/// the write; they do not crash.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write log entry: {0}")]
    Write(#[from] io::Error),
}

/// A formatter bound to a byte sink. One per process, shared read-only; the
/// sink is serialized behind a mutex so concurrent requests emit whole lines.
pub struct Logger {
    formatter: Formatter,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(formatter: Formatter, out: impl Write + Send + 'static) -> Self {
        Self {
            formatter,
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout(formatter: Formatter) -> Self {
        Self::new(formatter, io::stdout())
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Format and write one record, surfacing serialization and write
    /// failures to the caller.
    pub fn write_record(&self, record: &LogRecord) -> Result<(), FormatError> {
        let buf = self.formatter.format(record)?;
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(&buf)?;
        Ok(())
    }

    /// Fire-and-forget emission. A logging subsystem must not become a
    /// second source of outages, so failures degrade to a diagnostic and the
    /// record is dropped.
    pub fn log(&self, record: LogRecord) {
        if let Err(err) = self.write_record(&record) {
            tracing::warn!(error = %err, "dropping log record");
        }
    }
}
