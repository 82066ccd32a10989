use serde::Serialize;

use crate::context::ContextBlock;
use crate::error::AskError;
use crate::params::{Backend, ModelParameters};

/// Preamble for the system message that carries file context.
const CONTEXT_PREAMBLE: &str =
    "Use the following files as reference context. Each file is wrapped in a <file> tag \
     naming its path.\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// JSON body for the chat-completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatPayload<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub parameters: &'a ModelParameters,
}

/// A fully built request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Request {
    backend: Backend,
    parameters: ModelParameters,
    prompt: String,
    context: Option<ContextBlock>,
}

impl Request {
    /// Build a request from already-resolved parameters. Empty context blocks
    /// are dropped so no empty system message is sent.
    pub fn new(
        backend: Backend,
        parameters: ModelParameters,
        prompt: String,
        context: Option<ContextBlock>,
    ) -> Result<Self, AskError> {
        if prompt.trim().is_empty() {
            return Err(AskError::validation("prompt", "prompt must not be empty"));
        }
        parameters.validate()?;
        Ok(Self {
            backend,
            parameters,
            prompt,
            context: context.filter(|c| !c.is_empty()),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn context(&self) -> Option<&ContextBlock> {
        self.context.as_ref()
    }

    /// System context first (if any), then the user prompt.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(context) = &self.context {
            messages.push(ChatMessage {
                role: Role::System,
                content: format!("{CONTEXT_PREAMBLE}{}", context.render()),
            });
        }
        messages.push(ChatMessage {
            role: Role::User,
            content: self.prompt.clone(),
        });
        messages
    }

    pub fn payload(&self) -> ChatPayload<'_> {
        ChatPayload {
            model: self.backend.model_id(),
            messages: self.messages(),
            parameters: &self.parameters,
        }
    }
}

/// Append a code file to a free-form query in a fenced block.
pub fn with_code(query: &str, code: Option<&str>) -> String {
    match code {
        Some(code) => format!("{query}\n\n```\n{code}\n```"),
        None => query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextCollector, ContextLimits};

    fn params(backend: Backend) -> ModelParameters {
        ModelParameters::resolve(backend, &ModelParameters::default()).unwrap()
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let err = Request::new(Backend::Claude, params(Backend::Claude), "  \n".into(), None)
            .unwrap_err();
        assert!(matches!(err, AskError::Validation { .. }));
    }

    #[test]
    fn payload_without_context_has_single_user_message() {
        let req = Request::new(Backend::Grok, params(Backend::Grok), "hi".into(), None).unwrap();
        let json = serde_json::to_value(req.payload()).unwrap();
        assert_eq!(json["model"], "x-ai/grok-beta");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["temperature"], 0.8);
    }

    #[test]
    fn empty_context_block_is_dropped() {
        let empty = ContextCollector::new(ContextLimits::default()).collect::<&str>(&[]);
        let req = Request::new(Backend::Claude, params(Backend::Claude), "hi".into(), Some(empty))
            .unwrap();
        assert!(req.context().is_none());
        assert_eq!(req.messages().len(), 1);
    }

    #[test]
    fn gemini_payload_omits_unset_parameters() {
        let req =
            Request::new(Backend::Gemini, params(Backend::Gemini), "hi".into(), None).unwrap();
        let json = serde_json::to_value(req.payload()).unwrap();
        assert!(json.get("min_p").is_none());
        assert_eq!(json["top_k"], 40);
    }

    #[test]
    fn code_is_fenced_after_query() {
        assert_eq!(
            with_code("why?", Some("x = 1")),
            "why?\n\n```\nx = 1\n```"
        );
        assert_eq!(with_code("why?", None), "why?");
    }
}
