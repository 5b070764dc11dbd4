//! The dialect-neutral intermediate representation every transformer
//! converts to and from (spec §3, `UnifiedRequest` / `UnifiedResponse`).

use std::collections::BTreeMap;

use plexus_protocol::ApiType;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image { url: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
    Thinking { text: String, signature: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default)]
pub struct UnifiedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
}

/// Metadata the dispatcher attaches to a request about the target of the
/// call, forwarded onto the response so the response handler can compute
/// cost and write a `UsageRecord` without re-deriving routing decisions.
#[derive(Debug, Clone)]
pub struct PlexusMeta {
    pub provider: String,
    pub model: String,
    pub api_type: ApiType,
    pub canonical_model: String,
    pub provider_discount: Option<f64>,
    pub pricing: Option<plexus_common::ModelPricing>,
}

/// Dialect-neutral inference input (spec §3).
#[derive(Debug, Clone)]
pub struct UnifiedRequest {
    /// The alias or `provider/model` string the client sent.
    pub model: String,
    pub incoming_api_type: ApiType,
    pub messages: Vec<UnifiedMessage>,
    pub tools: Option<Value>,
    pub tool_choice: Option<Value>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub metadata: BTreeMap<String, Value>,
    /// Raw parsed body, retained so the dispatcher can forward it verbatim
    /// when the incoming and outgoing dialects match (pass-through).
    pub original_body: Option<Value>,
    pub request_id: String,
    /// Extended-thinking/reasoning budget in tokens, normalized from
    /// whichever dialect-specific knob the client used (OpenAI
    /// `reasoning_effort`, Anthropic `thinking.budget_tokens`); `None` or
    /// `<=0` means no thinking requested (spec §4.4).
    pub thinking_budget: Option<i64>,
}

impl UnifiedRequest {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Strips dispatcher-internal metadata keys (`selected_oauth_account`,
    /// `oauth_project_id`) that must never reach an upstream provider.
    pub fn strip_internal_metadata(&mut self) {
        self.metadata.remove("selected_oauth_account");
        self.metadata.remove("oauth_project_id");
    }
}

/// Dialect-neutral inference output (spec §3). `stream` and `content` are
/// mutually exclusive; callers on the streaming path never populate
/// `content`.
#[derive(Debug, Clone)]
pub struct UnifiedResponse {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<UnifiedToolCall>,
    pub usage: UnifiedUsage,
    pub finish_reason: Option<String>,
    pub raw_response: Option<Value>,
    pub plexus: Option<PlexusMeta>,
}

#[derive(Debug, Clone)]
pub struct UnifiedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One parsed event from an upstream provider's SSE body, already decoded
/// into dialect-neutral terms. Usage fields are cumulative totals per
/// spec §4.4: a transformer sets, never adds to, `usage` when an event
/// carries a fresh total.
#[derive(Debug, Clone, Default)]
pub struct UnifiedChunk {
    pub delta_text: Option<String>,
    pub delta_reasoning: Option<String>,
    pub tool_call_delta: Option<UnifiedToolCallDelta>,
    pub usage: Option<UnifiedUsage>,
    pub finish_reason: Option<String>,
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct UnifiedToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_fragment: Option<String>,
}
