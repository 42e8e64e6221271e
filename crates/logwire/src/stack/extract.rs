use std::error::Error as StdError;
use std::fmt;

use backtrace::Backtrace;

use crate::record::BoxError;

/// An error that captured the call stack when it was constructed. The
/// extractor recognizes this capability by downcast; any other error type
/// simply has no stack to offer.
pub struct TracedError {
    inner: BoxError,
    stack: Backtrace,
}

impl TracedError {
    pub fn new(inner: impl Into<BoxError>) -> Self {
        Self {
            inner: inner.into(),
            stack: Backtrace::new(),
        }
    }

    pub fn stack(&self) -> &Backtrace {
        &self.stack
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl StdError for TracedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Render the call stack attached to an error, if it carries one. The first
/// line restates the error under a synthetic goroutine banner because the
/// backend's trace parser keys on that header and none is available here.
/// Best effort: errors without the capability yield `None`, unresolvable
/// frames are dropped from the render.
pub fn render_error_stack(err: &(dyn StdError + Send + Sync + 'static)) -> Option<String> {
    let traced = err.downcast_ref::<TracedError>()?;
    let mut out = format!("{}\ngoroutine 1 [running]:\n", traced);
    out.push_str(&super::render_frames(traced.stack()).join("\n"));
    Some(out)
}
