//! The seven-operation contract every dialect transformer implements
//! (spec §4.4, design note in spec §9: "cyclic graph of transformers").
//! The dispatcher never imports a concrete transformer; it looks one up
//! from [`registry::transformer_for`] by [`ApiType`].

use plexus_protocol::ApiType;
use serde_json::Value;

use crate::error::Result;
use crate::unified::{UnifiedChunk, UnifiedRequest, UnifiedResponse};

/// A single decoded upstream SSE frame, fed to [`Transformer::transform_stream_event`]
/// one at a time by the streaming engine (see `plexus-providers::streaming`).
pub struct RawStreamEvent<'a> {
    pub event: Option<&'a str>,
    pub data: &'a str,
}

pub trait Transformer: Send + Sync {
    fn api_type(&self) -> ApiType;

    /// client body -> unified. Used for inbound validation and for the
    /// round-trip tests in spec §8 (`parseRequest(transformRequest(u)) == u`
    /// modulo dialect-lossy fields).
    fn parse_request(&self, raw: &Value) -> Result<UnifiedRequest>;

    /// unified -> upstream body, for calls targeting this dialect.
    fn transform_request(&self, unified: &UnifiedRequest) -> Result<Value>;

    /// upstream body (already JSON-parsed, this dialect) -> unified.
    fn transform_response(&self, upstream: &Value) -> Result<UnifiedResponse>;

    /// unified -> client body, rendering this dialect's response shape.
    fn format_response(&self, unified: &UnifiedResponse) -> Result<Value>;

    /// One upstream SSE frame (already dialect-decoded) -> zero or more
    /// unified chunks. A single frame can fan out (e.g. Anthropic's
    /// `message_start` seeds usage with no text) or fan in (ignored pings).
    fn transform_stream_event(&self, event: RawStreamEvent<'_>) -> Result<Vec<UnifiedChunk>>;

    /// unified chunk -> zero or more client-dialect SSE frames
    /// (`(event_name, json_data)` pairs; `event_name` is `None` for
    /// bare-data dialects).
    fn format_stream_chunk(&self, chunk: &UnifiedChunk) -> Vec<(Option<&'static str>, String)>;

    /// The terminal frame(s) this dialect's client stream ends with when
    /// the upstream stream completes naturally.
    fn format_stream_terminator(&self) -> Vec<(Option<&'static str>, String)>;

    fn endpoint(&self, unified: &UnifiedRequest) -> &'static str;
}
