//! Wire-format types for the three inference dialects this gateway speaks
//! (OpenAI chat-completions, Anthropic messages, Google Gemini) plus a
//! shared SSE line parser/renderer. Nothing here knows about routing,
//! dispatch, or persistence — this crate is pure serde types and framing.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod sse;

/// The three dialects this gateway understands, used throughout the
/// workspace to pick a transformer, a pricing table, or an auth scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Chat,
    Messages,
    Gemini,
}

impl ApiType {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiType::Chat => "chat",
            ApiType::Messages => "messages",
            ApiType::Gemini => "gemini",
        }
    }

    /// Case-insensitive parse used when matching a provider's declared
    /// `type` list or a model's `access_via` list against an incoming
    /// dialect name.
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "chat" | "openai" => Some(ApiType::Chat),
            "messages" | "anthropic" => Some(ApiType::Messages),
            "gemini" => Some(ApiType::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
