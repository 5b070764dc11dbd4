//! Dialect conversion: the unified intermediate representation, the
//! seven-operation `Transformer` contract, one implementation per dialect,
//! and the upstream-SSE -> unified-chunk half of the streaming engine
//! (spec §4.4, §4.5).

mod anthropic;
mod error;
mod gemini;
mod openai;
mod registry;
mod stream_engine;
mod transformer;
mod unified;

pub use error::{Result, TransformError};
pub use registry::transformer_for;
pub use stream_engine::StreamEngine;
pub use transformer::{RawStreamEvent, Transformer};
pub use unified::{
    ContentPart, MessageContent, PlexusMeta, Role, UnifiedChunk, UnifiedMessage, UnifiedRequest,
    UnifiedResponse, UnifiedToolCall, UnifiedToolCallDelta, UnifiedUsage,
};

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_protocol::ApiType;
    use serde_json::json;

    #[test]
    fn openai_round_trip_preserves_user_text() {
        let transformer = transformer_for(ApiType::Chat);
        let raw = json!({
            "model": "gpt-test",
            "messages": [{"role": "user", "content": "Hi"}],
            "max_tokens": 10,
            "stream": false,
        });
        let unified = transformer.parse_request(&raw).unwrap();
        assert_eq!(unified.messages.len(), 1);
        let rebuilt = transformer.transform_request(&unified).unwrap();
        assert_eq!(rebuilt["messages"][0]["content"], "Hi");
        assert_eq!(rebuilt["max_tokens"], 10);
    }

    #[test]
    fn anthropic_usage_maps_cache_read_tokens() {
        let transformer = transformer_for(ApiType::Messages);
        let upstream = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-haiku",
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 12,
                "output_tokens": 4,
                "cache_read_input_tokens": 3
            }
        });
        let unified = transformer.transform_response(&upstream).unwrap();
        assert_eq!(unified.content.as_deref(), Some("hello"));
        assert_eq!(unified.usage.input_tokens, 12);
        assert_eq!(unified.usage.cached_tokens, Some(3));
    }

    #[test]
    fn gemini_thinking_part_becomes_reasoning_content() {
        let transformer = transformer_for(ApiType::Gemini);
        let upstream = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "answer"}
                    ]
                },
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {
                "promptTokenCount": 5,
                "candidatesTokenCount": 2,
                "totalTokenCount": 7
            }
        });
        let unified = transformer.transform_response(&upstream).unwrap();
        assert_eq!(unified.content.as_deref(), Some("answer"));
        assert_eq!(unified.reasoning_content.as_deref(), Some("thinking..."));
    }

    #[test]
    fn openai_stream_event_done_marker_is_final() {
        let transformer = transformer_for(ApiType::Chat);
        let chunks = transformer
            .transform_stream_event(RawStreamEvent {
                event: None,
                data: "[DONE]",
            })
            .unwrap();
        assert!(chunks[0].is_final);
    }

    #[test]
    fn cumulative_usage_is_set_not_added_across_events() {
        let transformer = transformer_for(ApiType::Messages);
        let mut engine = StreamEngine::new(transformer);
        let start = "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"x\",\"content\":[],\"usage\":{\"input_tokens\":10,\"output_tokens\":0}}}\n\n";
        let delta = "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{},\"usage\":{\"input_tokens\":10,\"output_tokens\":5}}\n\n";
        let chunks1 = engine.push_str(start).unwrap();
        assert_eq!(chunks1[0].usage.as_ref().unwrap().output_tokens, 0);
        let chunks2 = engine.push_str(delta).unwrap();
        assert_eq!(chunks2[0].usage.as_ref().unwrap().output_tokens, 5);
    }
}
