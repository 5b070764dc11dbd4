//! A minimal SSE line parser shared by every provider's stream reader.
//!
//! Handles both named-event framing (`event: foo\ndata: {...}\n\n`, used by
//! Anthropic) and bare data framing (`data: {...}\n\n`, used by OpenAI and
//! Gemini's `alt=sse`), `\n` and `\r\n` line endings, and frames split
//! across chunk boundaries.

use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// `true` once this event carries the terminator payload for `dialect`
    /// (`data: [DONE]` for OpenAI, `event: message_stop` for Anthropic).
    /// Gemini's `alt=sse` stream has no explicit terminator; callers detect
    /// completion from stream end instead.
    pub fn is_openai_done(&self) -> bool {
        self.event.is_none() && self.data.trim() == "[DONE]"
    }

    pub fn is_anthropic_stop(&self) -> bool {
        self.event.as_deref() == Some("message_stop")
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.finish_event(&mut events);
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("event:") {
                let value = value.trim_start();
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
                continue;
            }
            if line == "event" {
                self.event = None;
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                let value = value.trim_start();
                self.data_lines.push(value.to_string());
                continue;
            }
            if line == "data" {
                self.data_lines.push(String::new());
                continue;
            }
        }

        events
    }

    /// Flush whatever is left in the buffer (e.g. the upstream closed the
    /// connection without a trailing blank line).
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(value) = line.strip_prefix("event:") {
                let value = value.trim_start();
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            } else if let Some(value) = line.strip_prefix("data:") {
                let value = value.trim_start();
                self.data_lines.push(value.to_string());
            }
        }
        self.finish_event(&mut events);
        events
    }

    fn finish_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        events.push(SseEvent {
            event: self.event.take(),
            data,
        });
        self.data_lines.clear();
    }
}

/// Render one SSE frame for the client, e.g. `event: message_stop\ndata: {...}\n\n`.
/// `sequence` sets the `id:` field used for A2A `Last-Event-Id` resumption;
/// inference streams pass `None`.
pub fn render_event(event: Option<&str>, data: &str, sequence: Option<u64>) -> String {
    let mut out = String::new();
    if let Some(seq) = sequence {
        out.push_str("id: ");
        out.push_str(&seq.to_string());
        out.push('\n');
    }
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(data);
    out.push_str("\n\n");
    out
}

pub fn render_keepalive_comment() -> &'static str {
    ": keepalive\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_data_events_with_lf() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert!(events[1].is_openai_done());
    }

    #[test]
    fn parses_named_events_with_crlf() {
        let mut parser = SseParser::new();
        let events =
            parser.push_str("event: message_start\r\ndata: {\"type\":\"message_start\"}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        let mut events = parser.push_str("event: content_block_delta\ndat");
        assert!(events.is_empty());
        events = parser.push_str("a: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":1}");
    }

    #[test]
    fn finish_flushes_trailing_frame_without_blank_line() {
        let mut parser = SseParser::new();
        let events = parser.push_str("event: message_stop\ndata: {}");
        assert!(events.is_empty());
        let flushed = parser.finish();
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].is_anthropic_stop());
    }
}
