use std::collections::BTreeMap;

use plexus_protocol::ApiType;
use plexus_protocol::openai::request::CreateChatCompletionRequest;
use plexus_protocol::openai::response::{ChatCompletionChoice, CreateChatCompletionResponse};
use plexus_protocol::openai::stream::{
    ChatCompletionStreamChoice, ChatCompletionStreamDelta, CreateChatCompletionStreamResponse,
};
use plexus_protocol::openai::types::{
    ChatCompletionContent, ChatCompletionMessage, CompletionTokensDetails, PromptTokensDetails,
    ToolCall, ToolCallFunction, Usage,
};
use serde_json::Value;

use crate::error::{Result, TransformError};
use crate::transformer::{RawStreamEvent, Transformer};
use crate::unified::{
    ContentPart, MessageContent, PlexusMeta, Role, UnifiedChunk, UnifiedMessage, UnifiedRequest,
    UnifiedResponse, UnifiedToolCall, UnifiedToolCallDelta, UnifiedUsage,
};

pub struct OpenAiTransformer;

fn content_to_text(content: &ChatCompletionContent) -> String {
    match content {
        ChatCompletionContent::Text(text) => text.clone(),
        ChatCompletionContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                plexus_protocol::openai::types::ChatCompletionContentPart::Text { text } => {
                    Some(text.clone())
                }
                plexus_protocol::openai::types::ChatCompletionContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

impl Transformer for OpenAiTransformer {
    fn api_type(&self) -> ApiType {
        ApiType::Chat
    }

    fn parse_request(&self, raw: &Value) -> Result<UnifiedRequest> {
        let parsed: CreateChatCompletionRequest = serde_json::from_value(raw.clone())
            .map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        let messages = parsed
            .messages
            .iter()
            .map(|m| match m {
                ChatCompletionMessage::System { content, .. } => UnifiedMessage {
                    role: Role::System,
                    content: MessageContent::Text(content_to_text(content)),
                },
                ChatCompletionMessage::User { content, .. } => UnifiedMessage {
                    role: Role::User,
                    content: MessageContent::Text(content_to_text(content)),
                },
                ChatCompletionMessage::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut parts = Vec::new();
                    if let Some(content) = content {
                        parts.push(ContentPart::Text(content_to_text(content)));
                    }
                    if let Some(calls) = tool_calls {
                        for call in calls {
                            let input = serde_json::from_str(&call.function.arguments)
                                .unwrap_or(Value::Null);
                            parts.push(ContentPart::ToolUse {
                                id: call.id.clone(),
                                name: call.function.name.clone(),
                                input,
                            });
                        }
                    }
                    UnifiedMessage {
                        role: Role::Assistant,
                        content: MessageContent::Parts(parts),
                    }
                }
                ChatCompletionMessage::Tool {
                    content,
                    tool_call_id,
                } => UnifiedMessage {
                    role: Role::Tool,
                    content: MessageContent::Parts(vec![ContentPart::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: content_to_text(content),
                        is_error: false,
                    }]),
                },
            })
            .collect();

        let tools = parsed
            .tools
            .as_ref()
            .map(|t| serde_json::to_value(t).unwrap_or(Value::Null));
        let tool_choice = parsed
            .tool_choice
            .as_ref()
            .map(|t| serde_json::to_value(t).unwrap_or(Value::Null));

        let mut metadata = BTreeMap::new();
        if let Some(meta) = &parsed.metadata {
            for (k, v) in meta {
                metadata.insert(k.clone(), Value::String(v.clone()));
            }
        }

        Ok(UnifiedRequest {
            model: parsed.model.clone(),
            incoming_api_type: ApiType::Chat,
            messages,
            tools,
            tool_choice,
            max_tokens: parsed.effective_max_tokens(),
            temperature: parsed.temperature,
            stream: parsed.stream.unwrap_or(false),
            metadata,
            original_body: Some(raw.clone()),
            request_id: plexus_common::new_request_id(),
            thinking_budget: parsed.reasoning_effort.as_deref().map(reasoning_effort_to_budget_tokens),
        })
    }

    fn transform_request(&self, unified: &UnifiedRequest) -> Result<Value> {
        let mut messages = Vec::with_capacity(unified.messages.len());
        for m in &unified.messages {
            let message = match m.role {
                Role::System => ChatCompletionMessage::System {
                    content: ChatCompletionContent::Text(text_of(&m.content)),
                    name: None,
                },
                Role::User => ChatCompletionMessage::User {
                    content: ChatCompletionContent::Text(text_of(&m.content)),
                    name: None,
                },
                Role::Assistant => {
                    let (text, tool_calls) = split_assistant_parts(&m.content);
                    ChatCompletionMessage::Assistant {
                        content: text.map(ChatCompletionContent::Text),
                        reasoning_content: None,
                        tool_calls,
                        name: None,
                    }
                }
                Role::Tool => {
                    let (tool_call_id, text) = tool_result_of(&m.content);
                    ChatCompletionMessage::Tool {
                        content: ChatCompletionContent::Text(text),
                        tool_call_id,
                    }
                }
            };
            messages.push(message);
        }

        let request = CreateChatCompletionRequest {
            model: unified.model.clone(),
            messages,
            max_tokens: unified.max_tokens,
            max_completion_tokens: None,
            temperature: unified.temperature,
            top_p: None,
            stop: None,
            stream: Some(unified.stream),
            tools: unified
                .tools
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            tool_choice: unified
                .tool_choice
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            metadata: None,
            user: None,
        };
        serde_json::to_value(request).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_response(&self, upstream: &Value) -> Result<UnifiedResponse> {
        let parsed: CreateChatCompletionResponse = serde_json::from_value(upstream.clone())
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let choice = parsed.choices.first();
        let (content, reasoning_content, tool_calls) = match choice {
            Some(ChatCompletionChoice { message, .. }) => extract_assistant(message),
            None => (None, None, Vec::new()),
        };

        let usage = parsed
            .usage
            .map(|u| UnifiedUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                cached_tokens: u.prompt_tokens_details.and_then(|d| d.cached_tokens),
                reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
            })
            .unwrap_or_default();

        Ok(UnifiedResponse {
            id: parsed.id,
            model: parsed.model,
            created: parsed.created,
            content,
            reasoning_content,
            tool_calls,
            usage,
            finish_reason: choice.and_then(|c| c.finish_reason.clone()),
            raw_response: Some(upstream.clone()),
            plexus: None,
        })
    }

    fn format_response(&self, unified: &UnifiedResponse) -> Result<Value> {
        let tool_calls = if unified.tool_calls.is_empty() {
            None
        } else {
            Some(
                unified
                    .tool_calls
                    .iter()
                    .map(|t| ToolCall {
                        id: t.id.clone(),
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: t.name.clone(),
                            arguments: serde_json::to_string(&t.arguments)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    })
                    .collect(),
            )
        };

        let response = CreateChatCompletionResponse {
            id: unified.id.clone(),
            object: CreateChatCompletionResponse::object_tag().to_string(),
            created: unified.created,
            model: unified.model.clone(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionMessage::Assistant {
                    content: unified.content.clone().map(ChatCompletionContent::Text),
                    reasoning_content: unified.reasoning_content.clone(),
                    tool_calls,
                    name: None,
                },
                finish_reason: Some(
                    unified
                        .finish_reason
                        .clone()
                        .unwrap_or_else(|| "stop".to_string()),
                ),
            }],
            usage: Some(Usage {
                prompt_tokens: unified.usage.input_tokens,
                completion_tokens: unified.usage.output_tokens,
                total_tokens: unified.usage.input_tokens + unified.usage.output_tokens,
                prompt_tokens_details: unified.usage.cached_tokens.map(|c| PromptTokensDetails {
                    cached_tokens: Some(c),
                }),
                completion_tokens_details: unified.usage.reasoning_tokens.map(|r| {
                    CompletionTokensDetails {
                        reasoning_tokens: Some(r),
                    }
                }),
            }),
        };
        serde_json::to_value(response).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_stream_event(&self, event: RawStreamEvent<'_>) -> Result<Vec<UnifiedChunk>> {
        if event.data.trim() == "[DONE]" {
            return Ok(vec![UnifiedChunk {
                is_final: true,
                ..Default::default()
            }]);
        }
        let parsed: CreateChatCompletionStreamResponse = serde_json::from_str(event.data)
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let choice = parsed.choices.into_iter().next();
        let mut chunk = UnifiedChunk::default();
        if let Some(choice) = choice {
            chunk.delta_text = choice.delta.content;
            chunk.delta_reasoning = choice.delta.reasoning_content;
            chunk.finish_reason = choice.finish_reason;
            if let Some(calls) = choice.delta.tool_calls {
                if let Some(first) = calls.into_iter().next() {
                    chunk.tool_call_delta = Some(UnifiedToolCallDelta {
                        index: 0,
                        id: Some(first.id),
                        name: Some(first.function.name),
                        arguments_fragment: Some(first.function.arguments),
                    });
                }
            }
        }
        if let Some(usage) = parsed.usage {
            chunk.usage = Some(UnifiedUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cached_tokens: usage.prompt_tokens_details.and_then(|d| d.cached_tokens),
                reasoning_tokens: usage
                    .completion_tokens_details
                    .and_then(|d| d.reasoning_tokens),
            });
        }
        Ok(vec![chunk])
    }

    fn format_stream_chunk(&self, chunk: &UnifiedChunk) -> Vec<(Option<&'static str>, String)> {
        if chunk.is_final {
            return Vec::new();
        }
        let delta = ChatCompletionStreamDelta {
            role: None,
            content: chunk.delta_text.clone(),
            reasoning_content: chunk.delta_reasoning.clone(),
            tool_calls: None,
        };
        let payload = CreateChatCompletionStreamResponse {
            id: "chatcmpl-stream".to_string(),
            object: CreateChatCompletionStreamResponse::object_tag().to_string(),
            created: 0,
            model: String::new(),
            choices: vec![ChatCompletionStreamChoice {
                index: 0,
                delta,
                finish_reason: chunk.finish_reason.clone(),
            }],
            usage: None,
        };
        let data = serde_json::to_string(&payload).unwrap_or_default();
        vec![(None, data)]
    }

    fn format_stream_terminator(&self) -> Vec<(Option<&'static str>, String)> {
        vec![(None, "[DONE]".to_string())]
    }

    fn endpoint(&self, _unified: &UnifiedRequest) -> &'static str {
        "/v1/chat/completions"
    }
}

/// OpenAI's `reasoning_effort` is already a level, not a budget; map it to
/// a representative token count so it round-trips through the same
/// budget-based `UnifiedRequest.thinking_budget` field the other dialects
/// use, landing back on the same level via `ThinkingLevel::from_budget_tokens`.
fn reasoning_effort_to_budget_tokens(effort: &str) -> i64 {
    match effort {
        "minimal" | "none" => 0,
        "low" => 1024,
        "medium" => 8192,
        "high" => 24576,
        _ => 8192,
    }
}

fn text_of(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn split_assistant_parts(content: &MessageContent) -> (Option<String>, Option<Vec<ToolCall>>) {
    match content {
        MessageContent::Text(text) => (Some(text.clone()), None),
        MessageContent::Parts(parts) => {
            let text: Vec<String> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .collect();
            let calls: Vec<ToolCall> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: name.clone(),
                            arguments: serde_json::to_string(input).unwrap_or_default(),
                        },
                    }),
                    _ => None,
                })
                .collect();
            (
                if text.is_empty() {
                    None
                } else {
                    Some(text.join("\n"))
                },
                if calls.is_empty() { None } else { Some(calls) },
            )
        }
    }
}

fn tool_result_of(content: &MessageContent) -> (String, String) {
    match content {
        MessageContent::Parts(parts) => {
            for p in parts {
                if let ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = p
                {
                    return (tool_use_id.clone(), content.clone());
                }
            }
            (String::new(), text_of(content))
        }
        MessageContent::Text(text) => (String::new(), text.clone()),
    }
}

fn extract_assistant(
    message: &ChatCompletionMessage,
) -> (Option<String>, Option<String>, Vec<UnifiedToolCall>) {
    match message {
        ChatCompletionMessage::Assistant {
            content,
            reasoning_content,
            tool_calls,
            ..
        } => {
            let text = content.as_ref().map(content_to_text);
            let calls = tool_calls
                .as_ref()
                .map(|calls| {
                    calls
                        .iter()
                        .map(|c| UnifiedToolCall {
                            id: c.id.clone(),
                            name: c.function.name.clone(),
                            arguments: serde_json::from_str(&c.function.arguments)
                                .unwrap_or(Value::Null),
                        })
                        .collect()
                })
                .unwrap_or_default();
            (text, reasoning_content.clone(), calls)
        }
        _ => (None, None, Vec::new()),
    }
}
