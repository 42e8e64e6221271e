use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use logwire::{LogRecord, Logger, SpanContext};

/// Request-scoped logging context: a cloneable handle carrying fields and
/// the ambient span for one request. The middleware installs one in the
/// request's extensions; handlers may pull it out to enrich the summary.
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<Inner>,
}

struct Inner {
    logger: Arc<Logger>,
    fields: Mutex<BTreeMap<String, Value>>,
    span: Option<SpanContext>,
}

impl RequestScope {
    pub fn new(logger: Arc<Logger>, span: Option<SpanContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger,
                fields: Mutex::new(BTreeMap::new()),
                span,
            }),
        }
    }

    pub fn span(&self) -> Option<SpanContext> {
        self.inner.span
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.inner.logger
    }

    /// Attach a field to every record later emitted from this scope.
    /// Re-adding a key replaces its value.
    pub fn add_field(&self, key: impl Into<String>, value: Value) {
        let mut fields = self
            .inner
            .fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fields.insert(key.into(), value);
    }

    /// Emit a record enriched with the scope's fields and span. The record's
    /// own fields win on key collisions.
    pub fn log(&self, mut record: LogRecord) {
        {
            let fields = self
                .inner
                .fields
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for (key, value) in fields.iter() {
                record
                    .fields
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        if record.span.is_none() {
            record.span = self.inner.span;
        }
        self.inner.logger.log(record);
    }
}
