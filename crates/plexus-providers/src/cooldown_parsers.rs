//! Provider-type-specific `429` body parsers (spec §4.2, §4.3, §7). Each
//! parser extracts a cooldown duration from a raw error body; a provider
//! type with no registered parser falls back to the default duration.

use std::collections::HashMap;

pub type CooldownParser = fn(&str) -> Option<i64>;

/// Anthropic's rate-limit error carries a `retry-after`-style hint in the
/// message text, e.g. `"Please retry after 45 seconds"`.
fn parse_anthropic(body: &str) -> Option<i64> {
    extract_seconds_after(body, "retry after").or_else(|| extract_seconds_after(body, "retry-after"))
}

/// OpenAI's quota errors embed `"Please try again in 1.5s"` or `"...in 20m"`.
fn parse_openai(body: &str) -> Option<i64> {
    extract_duration_try_again(body)
}

/// Gemini/Vertex quota errors carry a `RetryInfo` protobuf JSON field
/// `retryDelay: "30s"`.
fn parse_gemini(body: &str) -> Option<i64> {
    let marker = "\"retryDelay\"";
    let idx = body.find(marker)?;
    let rest = &body[idx + marker.len()..];
    let colon = rest.find(':')?;
    let rest = rest[colon + 1..].trim_start();
    let quote = rest.strip_prefix('"')?;
    let end = quote.find('"')?;
    parse_go_duration(&quote[..end])
}

/// A generic quota-vendor format sometimes seen from Naga-style gateways:
/// `{"error": {"retry_after_ms": 1500}}`.
fn parse_naga(body: &str) -> Option<i64> {
    let marker = "\"retry_after_ms\"";
    let idx = body.find(marker)?;
    let rest = &body[idx + marker.len()..];
    let colon = rest.find(':')?;
    let rest = rest[colon + 1..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse::<i64>().ok()
}

fn extract_seconds_after(body: &str, marker: &str) -> Option<i64> {
    let lower = body.to_ascii_lowercase();
    let idx = lower.find(marker)?;
    let rest = &body[idx + marker.len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let seconds: f64 = digits.parse().ok()?;
    Some((seconds * 1000.0) as i64)
}

fn extract_duration_try_again(body: &str) -> Option<i64> {
    let marker = "try again in";
    let lower = body.to_ascii_lowercase();
    let idx = lower.find(marker)?;
    let rest = body[idx + marker.len()..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == 'm' || c == 's' || c == 'h'))
        .unwrap_or(rest.len());
    parse_go_duration(rest[..end].trim())
}

/// Parses a small subset of Go-style duration strings (`45s`, `1.5s`,
/// `20m`, `2h`) as used by several quota-error payloads.
fn parse_go_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Some(num) = text.strip_suffix("ms") {
        return num.parse::<f64>().ok().map(|v| v as i64);
    }
    if let Some(num) = text.strip_suffix('s') {
        return num.parse::<f64>().ok().map(|v| (v * 1000.0) as i64);
    }
    if let Some(num) = text.strip_suffix('m') {
        return num.parse::<f64>().ok().map(|v| (v * 60_000.0) as i64);
    }
    if let Some(num) = text.strip_suffix('h') {
        return num.parse::<f64>().ok().map(|v| (v * 3_600_000.0) as i64);
    }
    text.parse::<f64>().ok().map(|v| (v * 1000.0) as i64)
}

pub struct CooldownParserRegistry {
    parsers: HashMap<&'static str, CooldownParser>,
}

impl Default for CooldownParserRegistry {
    fn default() -> Self {
        let mut parsers: HashMap<&'static str, CooldownParser> = HashMap::new();
        parsers.insert("messages", parse_anthropic as CooldownParser);
        parsers.insert("chat", parse_openai as CooldownParser);
        parsers.insert("gemini", parse_gemini as CooldownParser);
        parsers.insert("naga", parse_naga as CooldownParser);
        Self { parsers }
    }
}

impl CooldownParserRegistry {
    /// Returns `None` when no parser is registered for `provider_type`, or
    /// when the registered parser can't find a duration in `body` — either
    /// way the caller should fall back to the default cooldown.
    pub fn parse(&self, provider_type: &str, body: &str) -> Option<i64> {
        self.parsers.get(provider_type).and_then(|parser| parser(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_parser_extracts_seconds() {
        let registry = CooldownParserRegistry::default();
        let body = r#"{"error":{"message":"Rate limited. Please retry after 45 seconds."}}"#;
        let ms = registry.parse("messages", body).unwrap();
        assert!((40_000..=45_000).contains(&ms));
    }

    #[test]
    fn gemini_parser_extracts_retry_delay() {
        let registry = CooldownParserRegistry::default();
        let body = r#"{"error":{"details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"30s"}]}}"#;
        assert_eq!(registry.parse("gemini", body), Some(30_000));
    }

    #[test]
    fn unknown_provider_type_falls_back_to_none() {
        let registry = CooldownParserRegistry::default();
        assert_eq!(registry.parse("unknown", "anything"), None);
    }
}
