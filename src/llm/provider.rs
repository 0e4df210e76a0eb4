//! Vendor adapters.
//!
//! [`ProviderKind`] is the closed set of supported vendors. Each variant knows
//! how to authenticate, shape a chat request, pull the assistant text out of
//! the vendor's response envelope, and phrase a non-2xx failure.

use serde_json::{json, Value};

use crate::config::DEFAULT_GROK_MODEL;

/// `max_tokens` sent to the Anthropic messages endpoint.
pub const CLAUDE_MAX_TOKENS: u32 = 4096;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error bodies are cut to this many characters in tool output.
const ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// X.AI, OpenAI-compatible chat completions.
    Grok,
    OpenAi,
    /// Anthropic messages API.
    Claude,
    /// Local Ollama via its OpenAI-compatible endpoint. No key.
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::Grok, Self::OpenAi, Self::Claude, Self::Ollama];

    /// Config name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grok => "grok",
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Ollama => "ollama",
        }
    }

    /// Human-facing vendor label used in error text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Grok => "Grok",
            Self::OpenAi => "OpenAI",
            Self::Claude => "Claude",
            Self::Ollama => "Ollama",
        }
    }

    /// Environment variable holding the API key, if one is needed.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Grok => Some("XAI_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Claude => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn endpoint(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Claude => format!("{base}/messages"),
            Self::Grok | Self::OpenAi | Self::Ollama => format!("{base}/chat/completions"),
        }
    }

    pub fn request_body(&self, model: &str, prompt: &str) -> Value {
        let messages = json!([{ "role": "user", "content": prompt }]);
        match self {
            Self::Claude => json!({
                "model": model,
                "max_tokens": CLAUDE_MAX_TOKENS,
                "messages": messages,
            }),
            Self::Ollama => json!({
                "model": model,
                "messages": messages,
                "stream": false,
            }),
            Self::Grok | Self::OpenAi => json!({
                "model": model,
                "messages": messages,
            }),
        }
    }

    /// Attach auth headers for this vendor.
    pub fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        api_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match (self, api_key) {
            (Self::Claude, Some(key)) => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            (_, Some(key)) => request.bearer_auth(key),
            (_, None) => request,
        }
    }

    /// Pull the assistant's text out of a successful response body.
    pub fn extract_text(&self, body: &Value) -> Option<String> {
        match self {
            Self::Claude => flatten_content(body.get("content")?),
            Self::Grok | Self::OpenAi | Self::Ollama => {
                let message = body.get("choices")?.get(0)?.get("message")?;
                flatten_content(message.get("content")?)
            }
        }
    }

    /// Describe a non-2xx response.
    pub fn describe_failure(&self, status: u16, body: &str, model: &str) -> String {
        let detail = error_detail(body);
        match self {
            Self::Grok => diagnose_grok_error(status, &detail, model),
            _ => format!("{} API Error {status}: {detail}", self.label()),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grok" | "xai" => Ok(Self::Grok),
            "openai" => Ok(Self::OpenAi),
            "claude" | "anthropic" => Ok(Self::Claude),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

/// Flatten vendor content into one string.
///
/// Accepts a plain string, a single `{text}` object, or a list of typed
/// segments, in which case the text segments are concatenated in order.
pub fn flatten_content(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(segments) => {
            let mut out = String::new();
            let mut found = false;
            for segment in segments {
                let is_text = segment
                    .get("type")
                    .and_then(Value::as_str)
                    .is_none_or(|t| t == "text" || t == "output_text");
                if let (true, Some(text)) = (is_text, segment.get("text").and_then(Value::as_str)) {
                    out.push_str(text);
                    found = true;
                } else if let Value::String(s) = segment {
                    out.push_str(s);
                    found = true;
                }
            }
            found.then_some(out)
        }
        Value::Object(_) => content
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Readable detail from an error body: `error.message`, a string `error`, or
/// the raw body cut to a bounded length.
fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        let error = parsed.get("error");
        let message = error
            .and_then(|e| e.get("message"))
            .or(error)
            .and_then(Value::as_str)
            .or_else(|| parsed.get("message").and_then(Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }
    truncate_chars(body.trim(), ERROR_BODY_CHARS)
}

/// Grok errors get actionable hints for the two common misconfigurations.
pub fn diagnose_grok_error(status: u16, detail: &str, model: &str) -> String {
    let lower = detail.to_ascii_lowercase();
    let mut message = format!("Grok API Error {status}: {detail}");

    let model_missing = status == 404
        || lower.contains("model not found")
        || lower.contains("does not exist");
    if model_missing {
        message.push_str(&format!(
            ". Model '{model}' may be deprecated or unavailable; try '{DEFAULT_GROK_MODEL}'"
        ));
    } else if status == 401 || status == 403 {
        message.push_str(". Check that XAI_API_KEY is set to a valid key");
    }
    message
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("grok".parse::<ProviderKind>().unwrap(), ProviderKind::Grok);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert!("mistral".parse::<ProviderKind>().is_err());
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn claude_uses_messages_endpoint_with_max_tokens() {
        let kind = ProviderKind::Claude;
        assert_eq!(
            kind.endpoint("https://api.anthropic.com/v1/"),
            "https://api.anthropic.com/v1/messages"
        );
        let body = kind.request_body("claude-x", "hi");
        assert_eq!(body["max_tokens"], CLAUDE_MAX_TOKENS);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn chat_completion_providers_share_endpoint() {
        for kind in [ProviderKind::Grok, ProviderKind::OpenAi, ProviderKind::Ollama] {
            assert_eq!(kind.endpoint("http://h/v1"), "http://h/v1/chat/completions");
        }
        assert_eq!(ProviderKind::Ollama.request_body("m", "p")["stream"], false);
    }

    #[test]
    fn extracts_flat_string_content() {
        let body = json!({"choices": [{"message": {"content": "Hello"}}]});
        assert_eq!(ProviderKind::OpenAi.extract_text(&body).as_deref(), Some("Hello"));
    }

    #[test]
    fn flattens_segmented_content() {
        let body = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hel"},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "lo"}
        ]}}]});
        assert_eq!(ProviderKind::Grok.extract_text(&body).as_deref(), Some("Hello"));
    }

    #[test]
    fn extracts_claude_envelope() {
        let body = json!({"content": [{"type": "text", "text": "Hi there"}], "role": "assistant"});
        assert_eq!(ProviderKind::Claude.extract_text(&body).as_deref(), Some("Hi there"));
    }

    #[test]
    fn malformed_envelope_yields_none() {
        assert!(ProviderKind::OpenAi.extract_text(&json!({"choices": []})).is_none());
        assert!(ProviderKind::Claude.extract_text(&json!({"content": 5})).is_none());
    }

    #[test]
    fn grok_404_suggests_current_model() {
        let body = json!({"error": {"message": "Model not found: grok-beta"}}).to_string();
        let message = ProviderKind::Grok.describe_failure(404, &body, "grok-beta");
        assert!(message.contains("Model not found: grok-beta"));
        assert!(message.contains(DEFAULT_GROK_MODEL));
    }

    #[test]
    fn grok_401_mentions_key() {
        let message = ProviderKind::Grok.describe_failure(401, "unauthorized", "grok-3");
        assert!(message.contains("XAI_API_KEY"));
    }

    #[test]
    fn other_vendors_report_status_and_detail() {
        let message = ProviderKind::OpenAi.describe_failure(500, r#"{"error":"boom"}"#, "gpt");
        assert_eq!(message, "OpenAI API Error 500: boom");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
