// Structured log records in, backend wire entries out.

pub mod format;
pub mod layer;
pub mod logger;
pub mod record;
pub mod severity;
pub mod stack;
pub mod trace;
pub mod wire;

pub use format::{Formatter, StackStyle};
pub use layer::WireLayer;
pub use logger::{FormatError, Logger};
pub use record::{BoxError, Caller, LogRecord};
pub use severity::{Level, Severity};
pub use stack::{capture_stack, render_error_stack, TracedError};
pub use trace::SpanContext;
