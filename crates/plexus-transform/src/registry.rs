use plexus_protocol::ApiType;

use crate::anthropic::AnthropicTransformer;
use crate::gemini::GeminiTransformer;
use crate::openai::OpenAiTransformer;
use crate::transformer::Transformer;

/// Discovers the transformer for a dialect by name, the way spec §9 asks:
/// the dispatcher never imports a concrete transformer type, only this
/// factory.
pub fn transformer_for(api_type: ApiType) -> &'static dyn Transformer {
    static OPENAI: OpenAiTransformer = OpenAiTransformer;
    static ANTHROPIC: AnthropicTransformer = AnthropicTransformer;
    static GEMINI: GeminiTransformer = GeminiTransformer;
    match api_type {
        ApiType::Chat => &OPENAI,
        ApiType::Messages => &ANTHROPIC,
        ApiType::Gemini => &GEMINI,
    }
}
