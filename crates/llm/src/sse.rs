//! Incremental decoding of streamed vendor responses.
//!
//! Vendors deliver either SSE (`event:`/`data:` field lines separated by
//! blank lines, or bare `data:` lines) or newline-delimited JSON. Both ride
//! on chunked transfer, so a network read can end mid-line; these decoders
//! buffer partial input and only ever yield complete units.

/// Accumulates raw bytes and yields complete lines (trailing CR stripped).
pub(crate) struct LineDecoder {
    buffer: String,
}

impl LineDecoder {
    pub(crate) fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed one network chunk; returns the lines it completed.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Remaining partial line at end of stream, if any.
    pub(crate) fn finish(self) -> Option<String> {
        let tail = self.buffer.trim_end_matches('\r');
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }
}

/// One server-sent event. `event` is empty for bare `data:` streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Assembles [`SseEvent`]s from raw bytes: field lines accumulate until a
/// blank line dispatches the event. Comment and unknown field lines are
/// ignored per the SSE spec.
pub(crate) struct SseParser {
    decoder: LineDecoder,
    event_type: String,
    data: Vec<String>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self {
            decoder: LineDecoder::new(),
            event_type: String::new(),
            data: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for line in self.decoder.push(bytes) {
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        event: std::mem::take(&mut self.event_type),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                } else {
                    self.event_type.clear();
                }
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.event_type = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            // id:, retry:, and ":" comment lines carry nothing we need.
        }
        events
    }

    /// Dispatch a trailing event that was never terminated by a blank line.
    pub(crate) fn finish(mut self) -> Option<SseEvent> {
        if let Some(tail) = self.decoder.finish() {
            if let Some(rest) = tail.strip_prefix("data:") {
                self.data
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        if self.data.is_empty() {
            None
        } else {
            Some(SseEvent {
                event: self.event_type,
                data: self.data.join("\n"),
            })
        }
    }
}
