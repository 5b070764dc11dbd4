use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use plexus_protocol::ApiType;
use plexus_protocol::anthropic::request::CreateMessageRequest;
use plexus_protocol::anthropic::response::{CreateMessageResponse, MessageResponseType};
use plexus_protocol::anthropic::stream::{ContentBlockDelta, MessageDeltaPayload, MessageStreamEvent};
use plexus_protocol::anthropic::types::{
    ContentBlock, MessageContent as AnthropicMessageContent, MessageParam, MessageRole,
    SystemParam, TextBlock, TextBlockType, ThinkingConfig, ToolResultContent, Usage,
};
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, TransformError};
use crate::transformer::{RawStreamEvent, Transformer};
use crate::unified::{
    ContentPart, MessageContent, Role, UnifiedChunk, UnifiedMessage, UnifiedRequest,
    UnifiedResponse, UnifiedToolCall, UnifiedToolCallDelta, UnifiedUsage,
};

/// Matches the Claude Code CLI's synthetic `user_id`, e.g.
/// `user_abc123_account_def456_session_ghi789` (spec §4.4).
static CLAUDE_CODE_USER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^user_[^_]+_account_.+_session_.+$").unwrap());

const CLAUDE_CODE_PRELUDE: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

pub struct AnthropicTransformer;

impl Transformer for AnthropicTransformer {
    fn api_type(&self) -> ApiType {
        ApiType::Messages
    }

    fn parse_request(&self, raw: &Value) -> Result<UnifiedRequest> {
        let parsed: CreateMessageRequest = serde_json::from_value(raw.clone())
            .map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        let mut messages = Vec::with_capacity(parsed.messages.len() + 1);
        if let Some(system) = &parsed.system {
            messages.push(UnifiedMessage {
                role: Role::System,
                content: MessageContent::Text(system_to_text(system)),
            });
        }
        for m in &parsed.messages {
            messages.push(UnifiedMessage {
                role: match m.role {
                    MessageRole::User => Role::User,
                    MessageRole::Assistant => Role::Assistant,
                },
                content: anthropic_content_to_unified(&m.content),
            });
        }

        let mut metadata = BTreeMap::new();
        if let Some(meta) = &parsed.metadata {
            if let Some(user_id) = &meta.user_id {
                metadata.insert("user_id".to_string(), Value::String(user_id.clone()));
            }
        }

        Ok(UnifiedRequest {
            model: parsed.model.clone(),
            incoming_api_type: ApiType::Messages,
            messages,
            tools: parsed
                .tools
                .as_ref()
                .map(|t| serde_json::to_value(t).unwrap_or(Value::Null)),
            tool_choice: parsed
                .tool_choice
                .as_ref()
                .map(|t| serde_json::to_value(t).unwrap_or(Value::Null)),
            max_tokens: Some(parsed.max_tokens),
            temperature: parsed.temperature,
            stream: parsed.stream.unwrap_or(false),
            metadata,
            original_body: Some(raw.clone()),
            request_id: plexus_common::new_request_id(),
            thinking_budget: match &parsed.thinking {
                Some(ThinkingConfig::Enabled { budget_tokens }) => Some(*budget_tokens as i64),
                Some(ThinkingConfig::Disabled) => Some(0),
                None => None,
            },
        })
    }

    fn transform_request(&self, unified: &UnifiedRequest) -> Result<Value> {
        let is_claude_code = unified
            .metadata_str("user_id")
            .map(|id| CLAUDE_CODE_USER_ID.is_match(id))
            .unwrap_or(false);

        let mut system_texts: Vec<String> = Vec::new();
        if is_claude_code {
            system_texts.push(CLAUDE_CODE_PRELUDE.to_string());
        }

        let mut messages = Vec::new();
        for m in &unified.messages {
            match m.role {
                Role::System => system_texts.push(text_of(&m.content)),
                Role::User => messages.push(MessageParam {
                    role: MessageRole::User,
                    content: unified_content_to_anthropic(&m.content),
                }),
                Role::Assistant => messages.push(MessageParam {
                    role: MessageRole::Assistant,
                    content: unified_content_to_anthropic(&m.content),
                }),
                Role::Tool => {
                    // Anthropic has no dedicated tool role; tool results are
                    // user-turn content blocks.
                    messages.push(MessageParam {
                        role: MessageRole::User,
                        content: unified_content_to_anthropic(&m.content),
                    })
                }
            }
        }

        let system = if system_texts.is_empty() {
            None
        } else if system_texts.len() == 1 && !is_claude_code {
            Some(SystemParam::Text(system_texts.remove(0)))
        } else {
            Some(SystemParam::Blocks(
                system_texts
                    .into_iter()
                    .map(|text| TextBlock {
                        kind: TextBlockType::Text,
                        text,
                    })
                    .collect(),
            ))
        };

        let request = CreateMessageRequest {
            model: unified.model.clone(),
            max_tokens: unified.max_tokens.unwrap_or(4096),
            messages,
            system,
            temperature: unified.temperature,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: Some(unified.stream),
            tools: unified
                .tools
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            tool_choice: unified
                .tool_choice
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            thinking: None,
            metadata: None,
        };
        serde_json::to_value(request).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_response(&self, upstream: &Value) -> Result<UnifiedResponse> {
        let parsed: CreateMessageResponse = serde_json::from_value(upstream.clone())
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        for block in &parsed.content {
            match block {
                ContentBlock::Text { text } => content.push_str(text),
                ContentBlock::Thinking { thinking, .. } => reasoning.push_str(thinking),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(UnifiedToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                ContentBlock::ToolResult { .. } => {}
            }
        }

        Ok(UnifiedResponse {
            id: parsed.id,
            model: parsed.model,
            created: 0,
            content: if content.is_empty() { None } else { Some(content) },
            reasoning_content: if reasoning.is_empty() {
                None
            } else {
                Some(reasoning)
            },
            tool_calls,
            usage: UnifiedUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
                cached_tokens: parsed.usage.cache_read_input_tokens,
                reasoning_tokens: None,
            },
            finish_reason: parsed.stop_reason.map(|r| format!("{r:?}")),
            raw_response: Some(upstream.clone()),
            plexus: None,
        })
    }

    fn format_response(&self, unified: &UnifiedResponse) -> Result<Value> {
        let mut content = Vec::new();
        if let Some(reasoning) = &unified.reasoning_content {
            content.push(ContentBlock::Thinking {
                thinking: reasoning.clone(),
                signature: None,
            });
        }
        if let Some(text) = &unified.content {
            content.push(ContentBlock::Text { text: text.clone() });
        }
        for call in &unified.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            });
        }

        let response = CreateMessageResponse {
            id: unified.id.clone(),
            kind: MessageResponseType::Message,
            role: MessageRole::Assistant,
            model: unified.model.clone(),
            content,
            stop_reason: None,
            stop_sequence: None,
            usage: Usage {
                input_tokens: unified.usage.input_tokens,
                output_tokens: unified.usage.output_tokens,
                cache_read_input_tokens: unified.usage.cached_tokens,
                cache_creation_input_tokens: None,
            },
        };
        serde_json::to_value(response).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_stream_event(&self, event: RawStreamEvent<'_>) -> Result<Vec<UnifiedChunk>> {
        let name = event.event.unwrap_or_default();
        if name == "ping" || event.data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: MessageStreamEvent = serde_json::from_str(event.data)
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let chunk = match parsed {
            MessageStreamEvent::MessageStart { message } => UnifiedChunk {
                usage: Some(UnifiedUsage {
                    input_tokens: message.usage.input_tokens,
                    output_tokens: message.usage.output_tokens,
                    cached_tokens: message.usage.cache_read_input_tokens,
                    reasoning_tokens: None,
                }),
                ..Default::default()
            },
            MessageStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentBlockDelta::TextDelta { text } => UnifiedChunk {
                    delta_text: Some(text),
                    ..Default::default()
                },
                ContentBlockDelta::ThinkingDelta { thinking } => UnifiedChunk {
                    delta_reasoning: Some(thinking),
                    ..Default::default()
                },
                ContentBlockDelta::SignatureDelta { .. } => UnifiedChunk::default(),
                ContentBlockDelta::InputJsonDelta { partial_json } => UnifiedChunk {
                    tool_call_delta: Some(UnifiedToolCallDelta {
                        index: 0,
                        id: None,
                        name: None,
                        arguments_fragment: Some(partial_json),
                    }),
                    ..Default::default()
                },
            },
            MessageStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                ContentBlock::ToolUse { id, name, .. } => UnifiedChunk {
                    tool_call_delta: Some(UnifiedToolCallDelta {
                        index: 0,
                        id: Some(id),
                        name: Some(name),
                        arguments_fragment: None,
                    }),
                    ..Default::default()
                },
                _ => UnifiedChunk::default(),
            },
            MessageStreamEvent::MessageDelta { delta, usage } => UnifiedChunk {
                finish_reason: delta.stop_reason_str(),
                usage: Some(UnifiedUsage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cached_tokens: usage.cache_read_input_tokens,
                    reasoning_tokens: None,
                }),
                ..Default::default()
            },
            MessageStreamEvent::MessageStop => UnifiedChunk {
                is_final: true,
                ..Default::default()
            },
            MessageStreamEvent::ContentBlockStop { .. } | MessageStreamEvent::Ping => {
                UnifiedChunk::default()
            }
        };
        Ok(vec![chunk])
    }

    fn format_stream_chunk(&self, chunk: &UnifiedChunk) -> Vec<(Option<&'static str>, String)> {
        let mut out = Vec::new();
        if let Some(text) = &chunk.delta_text {
            let event = MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::TextDelta { text: text.clone() },
            };
            out.push((
                Some(event.event_name()),
                serde_json::to_string(&event).unwrap_or_default(),
            ));
        }
        if let Some(reasoning) = &chunk.delta_reasoning {
            let event = MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::ThinkingDelta {
                    thinking: reasoning.clone(),
                },
            };
            out.push((
                Some(event.event_name()),
                serde_json::to_string(&event).unwrap_or_default(),
            ));
        }
        out
    }

    fn format_stream_terminator(&self) -> Vec<(Option<&'static str>, String)> {
        let event = MessageStreamEvent::MessageStop;
        vec![(
            Some(event.event_name()),
            serde_json::to_string(&event).unwrap_or_default(),
        )]
    }

    fn endpoint(&self, _unified: &UnifiedRequest) -> &'static str {
        "/v1/messages"
    }
}

trait StopReasonStr {
    fn stop_reason_str(&self) -> Option<String>;
}

impl StopReasonStr for MessageDeltaPayload {
    fn stop_reason_str(&self) -> Option<String> {
        self.stop_reason.map(|r| format!("{r:?}"))
    }
}

fn system_to_text(system: &SystemParam) -> String {
    match system {
        SystemParam::Text(text) => text.clone(),
        SystemParam::Blocks(blocks) => blocks
            .iter()
            .map(|b| b.text.clone())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn anthropic_content_to_unified(content: &AnthropicMessageContent) -> MessageContent {
    match content {
        AnthropicMessageContent::Text(text) => MessageContent::Text(text.clone()),
        AnthropicMessageContent::Blocks(blocks) => {
            let parts = blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => ContentPart::Text(text.clone()),
                    ContentBlock::Thinking { thinking, signature } => ContentPart::Thinking {
                        text: thinking.clone(),
                        signature: signature.clone(),
                    },
                    ContentBlock::ToolUse { id, name, input } => ContentPart::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    },
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => ContentPart::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: match content {
                            ToolResultContent::Text(t) => t.clone(),
                            ToolResultContent::Blocks(_) => String::new(),
                        },
                        is_error: is_error.unwrap_or(false),
                    },
                })
                .collect();
            MessageContent::Parts(parts)
        }
    }
}

fn unified_content_to_anthropic(content: &MessageContent) -> AnthropicMessageContent {
    match content {
        MessageContent::Text(text) => AnthropicMessageContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            let blocks = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text(text) => ContentBlock::Text { text: text.clone() },
                    ContentPart::Thinking { text, signature } => ContentBlock::Thinking {
                        thinking: text.clone(),
                        signature: signature.clone(),
                    },
                    ContentPart::ToolUse { id, name, input } => ContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    },
                    ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: ToolResultContent::Text(content.clone()),
                        is_error: Some(*is_error),
                    },
                    ContentPart::Image { url } => ContentBlock::Text { text: url.clone() },
                })
                .collect();
            AnthropicMessageContent::Blocks(blocks)
        }
    }
}

fn text_of(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_code_user_id_prepends_prelude() {
        let transformer = AnthropicTransformer;
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "user_id".to_string(),
            Value::String("user_abc_account_def_session_ghi".to_string()),
        );
        let unified = UnifiedRequest {
            model: "claude-haiku".to_string(),
            incoming_api_type: ApiType::Messages,
            messages: vec![UnifiedMessage {
                role: Role::User,
                content: MessageContent::Text("hi".to_string()),
            }],
            tools: None,
            tool_choice: None,
            max_tokens: Some(10),
            temperature: None,
            stream: false,
            metadata,
            original_body: None,
            request_id: "r1".to_string(),
            thinking_budget: None,
        };
        let body = transformer.transform_request(&unified).unwrap();
        let system = body.get("system").unwrap();
        let blocks = system.as_array().unwrap();
        assert_eq!(blocks[0]["text"], CLAUDE_CODE_PRELUDE);
    }

    #[test]
    fn non_claude_code_user_id_does_not_prepend() {
        let transformer = AnthropicTransformer;
        let mut metadata = BTreeMap::new();
        metadata.insert("user_id".to_string(), Value::String("plain-user".to_string()));
        let unified = UnifiedRequest {
            model: "claude-haiku".to_string(),
            incoming_api_type: ApiType::Messages,
            messages: vec![
                UnifiedMessage {
                    role: Role::System,
                    content: MessageContent::Text("be nice".to_string()),
                },
                UnifiedMessage {
                    role: Role::User,
                    content: MessageContent::Text("hi".to_string()),
                },
            ],
            tools: None,
            tool_choice: None,
            max_tokens: Some(10),
            temperature: None,
            stream: false,
            metadata,
            original_body: None,
            request_id: "r2".to_string(),
            thinking_budget: None,
        };
        let body = transformer.transform_request(&unified).unwrap();
        assert_eq!(body["system"], Value::String("be nice".to_string()));
    }
}
