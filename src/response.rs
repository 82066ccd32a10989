use std::io::Write;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AskError;

/// How a completion is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// The generated text only.
    #[default]
    Text,
    /// The raw response body, pretty-printed.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A successful response from the endpoint.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub raw: Value,
    pub latency_ms: u64,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl Completion {
    /// Parse a success-status body. OpenRouter can report failures inside a
    /// 200 response as an `error` object; those become upstream errors.
    pub fn from_body(
        bytes: &[u8],
        provider: &str,
        requested_model: &str,
        latency_ms: u64,
    ) -> Result<Self, AskError> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|e| AskError::SchemaParse(format!("response is not JSON: {e}")))?;

        if let Some(error) = raw.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            let status = error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok());
            return Err(AskError::Upstream {
                provider: provider.to_string(),
                message,
                status,
            });
        }

        let completion: ChatCompletion = serde_json::from_value(raw.clone())
            .map_err(|e| AskError::SchemaParse(format!("failed to parse response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AskError::Upstream {
                provider: provider.to_string(),
                message: "empty choices or null content".to_string(),
                status: None,
            })?;

        Ok(Self {
            text,
            model: completion
                .model
                .unwrap_or_else(|| requested_model.to_string()),
            usage: completion.usage,
            raw,
            latency_ms,
        })
    }

    /// Write the completion in one piece. Nothing is written until the whole
    /// output is formatted.
    pub fn write_to<W: Write>(&self, out: &mut W, mode: OutputMode) -> std::io::Result<()> {
        let rendered = match mode {
            OutputMode::Text => format!("{}\n", self.text.trim_end()),
            OutputMode::Json => {
                let mut s = serde_json::to_string_pretty(&self.raw)?;
                s.push('\n');
                s
            }
        };
        out.write_all(rendered.as_bytes())?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "id": "gen-1",
        "model": "x-ai/grok-beta",
        "choices": [{"message": {"role": "assistant", "content": "Looks fine."}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
    }"#;

    #[test]
    fn parses_text_model_and_usage() {
        let c = Completion::from_body(OK_BODY.as_bytes(), "openrouter", "req", 5).unwrap();
        assert_eq!(c.text, "Looks fine.");
        assert_eq!(c.model, "x-ai/grok-beta");
        assert_eq!(c.usage.unwrap().total_tokens, 15);
        assert_eq!(c.latency_ms, 5);
    }

    #[test]
    fn missing_model_falls_back_to_requested() {
        let body = r#"{"choices":[{"message":{"content":"x"}}]}"#;
        let c = Completion::from_body(body.as_bytes(), "openrouter", "req-model", 0).unwrap();
        assert_eq!(c.model, "req-model");
        assert!(c.usage.is_none());
    }

    #[test]
    fn error_object_in_body_is_upstream_error() {
        let body = r#"{"error":{"message":"No credits","code":402}}"#;
        let err = Completion::from_body(body.as_bytes(), "openrouter", "m", 0).unwrap_err();
        match err {
            AskError::Upstream { message, status, .. } => {
                assert_eq!(message, "No credits");
                assert_eq!(status, Some(402));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_schema_error() {
        let err = Completion::from_body(b"<html>", "openrouter", "m", 0).unwrap_err();
        assert!(matches!(err, AskError::SchemaParse(_)));
    }

    #[test]
    fn empty_choices_is_upstream_error() {
        let err = Completion::from_body(br#"{"choices":[]}"#, "openrouter", "m", 0).unwrap_err();
        assert!(matches!(err, AskError::Upstream { .. }));
    }

    #[test]
    fn text_mode_writes_content_only() {
        let c = Completion::from_body(OK_BODY.as_bytes(), "openrouter", "m", 0).unwrap();
        let mut out = Vec::new();
        c.write_to(&mut out, OutputMode::Text).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Looks fine.\n");
    }

    #[test]
    fn json_mode_writes_raw_body() {
        let c = Completion::from_body(OK_BODY.as_bytes(), "openrouter", "m", 0).unwrap();
        let mut out = Vec::new();
        c.write_to(&mut out, OutputMode::Json).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["id"], "gen-1");
        assert_eq!(parsed["usage"]["total_tokens"], 15);
    }
}
