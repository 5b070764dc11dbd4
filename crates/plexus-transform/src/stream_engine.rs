//! The upstream-SSE -> unified-chunk half of the streaming engine (spec
//! §4.5). Byte buffering and line re-assembly is `plexus_protocol::sse`;
//! this module turns parsed SSE frames into [`UnifiedChunk`]s and tracks
//! the two streaming metrics the response handler needs: time-to-first-token
//! and a rough output-token estimate. The client-facing half (byte tap,
//! cancellation, antigravity envelope) lives in `plexus-providers` since it
//! owns the async HTTP body.

use std::time::{Duration, Instant};

use plexus_protocol::sse::SseParser;

use crate::transformer::{RawStreamEvent, Transformer};
use crate::unified::UnifiedChunk;

pub struct StreamEngine<'a> {
    parser: SseParser,
    transformer: &'a dyn Transformer,
    started_at: Instant,
    first_token_at: Option<Instant>,
    /// Rough output-token estimate: whitespace-delimited word count of every
    /// text/reasoning delta seen so far. Not a real tokenizer — spec §4.4
    /// explicitly allows a pluggable, approximate counter here.
    estimated_output_tokens: u64,
}

impl<'a> StreamEngine<'a> {
    pub fn new(transformer: &'a dyn Transformer) -> Self {
        Self {
            parser: SseParser::new(),
            transformer,
            started_at: Instant::now(),
            first_token_at: None,
            estimated_output_tokens: 0,
        }
    }

    pub fn time_to_first_token(&self) -> Option<Duration> {
        self.first_token_at.map(|t| t.duration_since(self.started_at))
    }

    pub fn estimated_output_tokens(&self) -> u64 {
        self.estimated_output_tokens
    }

    fn observe(&mut self, chunk: &UnifiedChunk) {
        let mut text_len = 0usize;
        if let Some(text) = &chunk.delta_text {
            text_len += text.split_whitespace().count();
        }
        if let Some(reasoning) = &chunk.delta_reasoning {
            text_len += reasoning.split_whitespace().count();
        }
        if text_len > 0 {
            self.first_token_at.get_or_insert_with(Instant::now);
            self.estimated_output_tokens += text_len as u64;
        }
    }

    /// Feed one chunk of upstream bytes, returning every [`UnifiedChunk`]
    /// the SSE frames it completed decode to.
    pub fn push_str(&mut self, chunk: &str) -> crate::error::Result<Vec<UnifiedChunk>> {
        let events = self.parser.push_str(chunk);
        self.decode_events(events)
    }

    pub fn finish(&mut self) -> crate::error::Result<Vec<UnifiedChunk>> {
        let events = self.parser.finish();
        self.decode_events(events)
    }

    fn decode_events(
        &mut self,
        events: Vec<plexus_protocol::sse::SseEvent>,
    ) -> crate::error::Result<Vec<UnifiedChunk>> {
        let mut out = Vec::new();
        for event in events {
            let decoded = self.transformer.transform_stream_event(RawStreamEvent {
                event: event.event.as_deref(),
                data: &event.data,
            })?;
            for chunk in decoded {
                self.observe(&chunk);
                out.push(chunk);
            }
        }
        Ok(out)
    }
}
