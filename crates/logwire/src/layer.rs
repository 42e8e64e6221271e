use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::logger::Logger;
use crate::record::LogRecord;
use crate::severity::Level;

/// `tracing_subscriber` layer that turns events into wire entries through a
/// shared [`Logger`]. The event's own callsite metadata supplies the caller,
/// so no stack walking happens on this path.
pub struct WireLayer {
    logger: Arc<Logger>,
}

impl WireLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for WireLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = if *meta.level() == tracing::Level::ERROR {
            Level::Error
        } else if *meta.level() == tracing::Level::WARN {
            Level::Warn
        } else if *meta.level() == tracing::Level::INFO {
            Level::Info
        } else if *meta.level() == tracing::Level::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        };

        let mut fields = BTreeMap::new();
        let mut message = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let mut record =
            LogRecord::new(level, message.unwrap_or_default()).with_time(Utc::now());
        record.fields = fields;
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            record = record.with_caller(file, line, meta.target());
        }

        self.logger.log(record);
    }
}

/// Collects event fields into the record's residual map, separating the
/// message and stringifying error values so JSON encoding cannot drop them.
struct FieldVisitor<'a> {
    fields: &'a mut BTreeMap<String, Value>,
    message: &'a mut Option<String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{value:?}")));
        }
    }
}

/// Install a global subscriber that writes wire entries to the logger,
/// filtered by `RUST_LOG` when set.
pub fn init(logger: Arc<Logger>) {
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(WireLayer::new(logger))
        .init();
}
