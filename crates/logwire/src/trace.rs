/// Distributed-trace correlation ambient to a request's execution: trace id,
/// span id, and whether the trace was sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    trace_id: [u8; 16],
    span_id: [u8; 8],
    sampled: bool,
}

impl SpanContext {
    pub fn new(trace_id: [u8; 16], span_id: [u8; 8], sampled: bool) -> Self {
        Self {
            trace_id,
            span_id,
            sampled,
        }
    }

    /// Both ids must be nonzero to correlate anything.
    pub fn is_valid(&self) -> bool {
        self.trace_id != [0u8; 16] && self.span_id != [0u8; 8]
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// 32 lowercase hex digits.
    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    /// 16 lowercase hex digits, per the backend's span addressing.
    pub fn span_id_hex(&self) -> String {
        hex::encode(self.span_id)
    }

    /// Parse the load balancer's trace header: `TRACE_ID/SPAN_ID;o=1` with a
    /// 32-hex-digit trace id and a decimal span id.
    pub fn from_cloud_header(value: &str) -> Option<Self> {
        let (trace_part, rest) = value.split_once('/')?;
        if trace_part.len() != 32 {
            return None;
        }
        let mut trace_id = [0u8; 16];
        let decoded = hex::decode(trace_part).ok()?;
        trace_id.copy_from_slice(&decoded);

        let (span_part, options) = match rest.split_once(';') {
            Some((span, opts)) => (span, Some(opts)),
            None => (rest, None),
        };
        let span: u64 = span_part.trim().parse().ok()?;
        let span_id = span.to_be_bytes();

        let sampled = options
            .map(|opts| opts.split(';').any(|part| part.trim() == "o=1"))
            .unwrap_or(false);

        let ctx = Self {
            trace_id,
            span_id,
            sampled,
        };
        ctx.is_valid().then_some(ctx)
    }
}
