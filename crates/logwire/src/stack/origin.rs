use backtrace::Backtrace;
use regex::Regex;

/// A resolved frame candidate for error-origin attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Keep only the suffix after a vendoring marker so skip patterns match the
/// logical path, not the checkout location. Handles `vendor/` trees and
/// cargo registry checkouts.
fn strip_vendor(path: &str) -> &str {
    if let Some((_, rest)) = path.split_once("/vendor/") {
        return rest;
    }
    if let Some((_, rest)) = path.split_once("/registry/src/") {
        // the first component after the marker is the registry index
        if let Some((_, tail)) = rest.split_once('/') {
            return tail;
        }
    }
    path
}

/// First frame not excluded by the skip rules; `None` when the walk
/// exhausts the stack, which callers treat as "unknown origin".
pub(crate) fn select_frame<I>(frames: I, skip: &[String], skip_regex: Option<&Regex>) -> Option<Frame>
where
    I: IntoIterator<Item = Frame>,
{
    'frames: for frame in frames {
        let path = strip_vendor(&frame.file);
        for pattern in skip {
            if frame.function.contains(pattern.as_str()) || path.contains(pattern.as_str()) {
                continue 'frames;
            }
        }
        if let Some(regex) = skip_regex {
            if regex.is_match(&frame.function) {
                continue;
            }
        }
        return Some(frame);
    }
    None
}

/// Walk the live call stack outward from here and return the first frame
/// surviving the skip rules. Supplements, never overrides, a caller the
/// logging framework recorded at log time.
pub fn resolve_origin(skip: &[String], skip_regex: Option<&Regex>) -> Option<Frame> {
    resolve_origin_from(skip, skip_regex, 0)
}

/// Like [`resolve_origin`], starting `start` frames further out.
pub fn resolve_origin_from(
    skip: &[String],
    skip_regex: Option<&Regex>,
    start: usize,
) -> Option<Frame> {
    let backtrace = Backtrace::new();
    let frames = backtrace
        .frames()
        .iter()
        .skip(start)
        .flat_map(|frame| frame.symbols())
        .filter_map(|symbol| {
            let function = symbol.name()?.to_string();
            let file = symbol.filename()?.to_string_lossy().into_owned();
            let line = symbol.lineno()?;
            Some(Frame {
                function,
                file,
                line,
            })
        })
        .collect::<Vec<_>>();
    select_frame(frames, skip, skip_regex)
}
