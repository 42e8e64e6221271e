pub mod extract;
pub mod origin;

pub use extract::{render_error_stack, TracedError};
pub use origin::{resolve_origin, Frame};

use backtrace::Backtrace;

/// Capture and render the current call stack in the multi-line form the
/// error backend parses. Used at panic-recovery time, when the original
/// frames are about to unwind.
pub fn capture_stack() -> String {
    let mut out = String::from("goroutine 1 [running]:\n");
    out.push_str(&render_frames(&Backtrace::new()).join("\n"));
    out
}

/// `function()\n\tfile:line +offset` per resolvable frame, innermost first.
/// Frames that cannot be resolved are omitted.
pub(crate) fn render_frames(backtrace: &Backtrace) -> Vec<String> {
    let mut lines = Vec::new();
    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            let (Some(name), Some(file), Some(line)) =
                (symbol.name(), symbol.filename(), symbol.lineno())
            else {
                continue;
            };
            let addr = symbol.addr().map(|a| a as usize).unwrap_or(0);
            lines.push(format!("{}()\n\t{}:{} +{:#x}", name, file.display(), line, addr));
        }
    }
    lines
}
