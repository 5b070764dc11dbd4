use std::collections::BTreeMap;

use plexus_protocol::ApiType;
use plexus_protocol::gemini::request::GenerateContentRequest;
use plexus_protocol::gemini::response::{Candidate, GenerateContentResponse};
use plexus_protocol::gemini::types::{
    Content, FinishReason, GenerationConfig, Part, Role, ThinkingConfig, ThinkingLevel, UsageMetadata,
};
use serde_json::Value;

use crate::error::{Result, TransformError};
use crate::transformer::{RawStreamEvent, Transformer};
use crate::unified::{
    ContentPart, MessageContent, UnifiedChunk, UnifiedMessage, UnifiedRequest, UnifiedResponse,
    UnifiedToolCall, UnifiedUsage,
};
use crate::unified::Role as UnifiedRole;

pub struct GeminiTransformer;

fn content_text(content: &Content) -> String {
    content
        .parts
        .iter()
        .filter_map(|p| p.text.clone())
        .collect::<Vec<_>>()
        .join("")
}

impl Transformer for GeminiTransformer {
    fn api_type(&self) -> ApiType {
        ApiType::Gemini
    }

    fn parse_request(&self, raw: &Value) -> Result<UnifiedRequest> {
        let parsed: GenerateContentRequest = serde_json::from_value(raw.clone())
            .map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        let mut messages = Vec::new();
        if let Some(system) = &parsed.system_instruction {
            messages.push(UnifiedMessage {
                role: UnifiedRole::System,
                content: MessageContent::Text(content_text(system)),
            });
        }
        for c in &parsed.contents {
            let role = match c.role {
                Some(Role::Model) => UnifiedRole::Assistant,
                _ => UnifiedRole::User,
            };
            let mut parts = Vec::new();
            for part in &c.parts {
                if let Some(text) = &part.text {
                    parts.push(ContentPart::Text(text.clone()));
                }
                if let Some(call) = &part.function_call {
                    parts.push(ContentPart::ToolUse {
                        id: call.name.clone(),
                        name: call.name.clone(),
                        input: call.args.clone(),
                    });
                }
                if let Some(resp) = &part.function_response {
                    parts.push(ContentPart::ToolResult {
                        tool_use_id: resp.name.clone(),
                        content: resp.response.to_string(),
                        is_error: false,
                    });
                }
            }
            messages.push(UnifiedMessage {
                role,
                content: MessageContent::Parts(parts),
            });
        }

        let gen = parsed.generation_config.clone().unwrap_or_default();
        let tools = parsed
            .tools
            .as_ref()
            .map(|t| serde_json::to_value(t).unwrap_or(Value::Null));
        let thinking_budget = gen.thinking_config.as_ref().and_then(|tc| tc.thinking_budget);

        Ok(UnifiedRequest {
            model: String::new(),
            incoming_api_type: ApiType::Gemini,
            messages,
            tools,
            tool_choice: None,
            max_tokens: gen.max_output_tokens,
            temperature: gen.temperature,
            stream: false,
            metadata: BTreeMap::new(),
            original_body: Some(raw.clone()),
            request_id: plexus_common::new_request_id(),
            thinking_budget,
        })
    }

    fn transform_request(&self, unified: &UnifiedRequest) -> Result<Value> {
        let mut contents = Vec::new();
        let mut system_instruction = None;
        for m in &unified.messages {
            let parts = unified_content_to_parts(&m.content);
            match m.role {
                UnifiedRole::System => {
                    system_instruction = Some(Content { role: None, parts });
                }
                UnifiedRole::User | UnifiedRole::Tool => {
                    contents.push(Content {
                        role: Some(Role::User),
                        parts,
                    });
                }
                UnifiedRole::Assistant => {
                    contents.push(Content {
                        role: Some(Role::Model),
                        parts,
                    });
                }
            }
        }

        let thinking_level = unified.thinking_budget.and_then(ThinkingLevel::from_budget_tokens);
        let thinking_config = thinking_level.map(|level| ThinkingConfig {
            thinking_budget: None,
            thinking_level: Some(level),
            include_thoughts: None,
        });

        let request = GenerateContentRequest {
            contents,
            system_instruction,
            tools: unified
                .tools
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            generation_config: Some(GenerationConfig {
                temperature: unified.temperature,
                top_p: None,
                max_output_tokens: unified.max_tokens,
                stop_sequences: None,
                thinking_config,
            }),
        };
        serde_json::to_value(request).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_response(&self, upstream: &Value) -> Result<UnifiedResponse> {
        let parsed: GenerateContentResponse = serde_json::from_value(upstream.clone())
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let candidate = parsed.candidates.first();
        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        if let Some(candidate) = candidate {
            for part in &candidate.content.parts {
                if part.thought == Some(true) {
                    if let Some(t) = &part.text {
                        reasoning.push_str(t);
                    }
                    continue;
                }
                if let Some(t) = &part.text {
                    text.push_str(t);
                }
                if let Some(call) = &part.function_call {
                    tool_calls.push(UnifiedToolCall {
                        id: call.name.clone(),
                        name: call.name.clone(),
                        arguments: call.args.clone(),
                    });
                }
            }
        }

        let usage = parsed
            .usage_metadata
            .map(|u| UnifiedUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
                cached_tokens: u.cached_content_token_count,
                reasoning_tokens: u.thoughts_token_count,
            })
            .unwrap_or_default();

        Ok(UnifiedResponse {
            id: plexus_common::new_trace_id(),
            model: parsed.model_version.unwrap_or_default(),
            created: 0,
            content: if text.is_empty() { None } else { Some(text) },
            reasoning_content: if reasoning.is_empty() {
                None
            } else {
                Some(reasoning)
            },
            tool_calls,
            usage,
            finish_reason: candidate
                .and_then(|c| c.finish_reason)
                .map(|r| format!("{r:?}")),
            raw_response: Some(upstream.clone()),
            plexus: None,
        })
    }

    fn format_response(&self, unified: &UnifiedResponse) -> Result<Value> {
        let mut parts = Vec::new();
        if let Some(reasoning) = &unified.reasoning_content {
            parts.push(Part {
                text: Some(reasoning.clone()),
                function_call: None,
                function_response: None,
                thought: Some(true),
            });
        }
        if let Some(text) = &unified.content {
            parts.push(Part {
                text: Some(text.clone()),
                function_call: None,
                function_response: None,
                thought: None,
            });
        }
        for call in &unified.tool_calls {
            parts.push(Part {
                text: None,
                function_call: Some(plexus_protocol::gemini::types::FunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                function_response: None,
                thought: None,
            });
        }

        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: Some(Role::Model),
                    parts,
                },
                finish_reason: Some(FinishReason::Stop),
                index: 0,
            }],
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: unified.usage.input_tokens,
                candidates_token_count: unified.usage.output_tokens,
                total_token_count: unified.usage.input_tokens + unified.usage.output_tokens,
                cached_content_token_count: unified.usage.cached_tokens,
                thoughts_token_count: unified.usage.reasoning_tokens,
            }),
            model_version: Some(unified.model.clone()),
        };
        serde_json::to_value(response).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }

    fn transform_stream_event(&self, event: RawStreamEvent<'_>) -> Result<Vec<UnifiedChunk>> {
        let parsed: GenerateContentResponse = serde_json::from_str(event.data)
            .map_err(|e| TransformError::MalformedResponse(e.to_string()))?;

        let candidate = parsed.candidates.into_iter().next();
        let mut chunk = UnifiedChunk::default();
        if let Some(candidate) = candidate {
            for part in &candidate.content.parts {
                if part.thought == Some(true) {
                    if let Some(t) = &part.text {
                        chunk.delta_reasoning.get_or_insert_with(String::new).push_str(t);
                    }
                } else if let Some(t) = &part.text {
                    chunk.delta_text.get_or_insert_with(String::new).push_str(t);
                }
            }
            chunk.finish_reason = candidate.finish_reason.map(|r| format!("{r:?}"));
        }
        if let Some(usage) = parsed.usage_metadata {
            chunk.usage = Some(UnifiedUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                cached_tokens: usage.cached_content_token_count,
                reasoning_tokens: usage.thoughts_token_count,
            });
        }
        Ok(vec![chunk])
    }

    fn format_stream_chunk(&self, chunk: &UnifiedChunk) -> Vec<(Option<&'static str>, String)> {
        let mut parts = Vec::new();
        if let Some(reasoning) = &chunk.delta_reasoning {
            parts.push(Part {
                text: Some(reasoning.clone()),
                function_call: None,
                function_response: None,
                thought: Some(true),
            });
        }
        if let Some(text) = &chunk.delta_text {
            parts.push(Part {
                text: Some(text.clone()),
                function_call: None,
                function_response: None,
                thought: None,
            });
        }
        if parts.is_empty() {
            return Vec::new();
        }
        let payload = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: Some(Role::Model),
                    parts,
                },
                finish_reason: None,
                index: 0,
            }],
            usage_metadata: None,
            model_version: None,
        };
        vec![(None, serde_json::to_string(&payload).unwrap_or_default())]
    }

    fn format_stream_terminator(&self) -> Vec<(Option<&'static str>, String)> {
        // Gemini's `alt=sse` stream has no explicit terminator (spec §4.5);
        // completion is signaled by the connection closing.
        Vec::new()
    }

    fn endpoint(&self, unified: &UnifiedRequest) -> &'static str {
        if unified.stream {
            ":streamGenerateContent"
        } else {
            ":generateContent"
        }
    }
}

fn unified_content_to_parts(content: &MessageContent) -> Vec<Part> {
    match content {
        MessageContent::Text(text) => vec![Part {
            text: Some(text.clone()),
            function_call: None,
            function_response: None,
            thought: None,
        }],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(text) => Part {
                    text: Some(text.clone()),
                    function_call: None,
                    function_response: None,
                    thought: None,
                },
                ContentPart::Thinking { text, .. } => Part {
                    text: Some(text.clone()),
                    function_call: None,
                    function_response: None,
                    thought: Some(true),
                },
                ContentPart::ToolUse { name, input, .. } => Part {
                    text: None,
                    function_call: Some(plexus_protocol::gemini::types::FunctionCall {
                        name: name.clone(),
                        args: input.clone(),
                    }),
                    function_response: None,
                    thought: None,
                },
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Part {
                    text: None,
                    function_call: None,
                    function_response: Some(plexus_protocol::gemini::types::FunctionResponse {
                        name: tool_use_id.clone(),
                        response: serde_json::from_str(content).unwrap_or(Value::String(content.clone())),
                    }),
                    thought: None,
                },
                ContentPart::Image { url } => Part {
                    text: Some(url.clone()),
                    function_call: None,
                    function_response: None,
                    thought: None,
                },
            })
            .collect(),
    }
}
