use thiserror::Error;

/// Process exit status for a completed request.
pub const EXIT_SUCCESS: u8 = 0;
/// Network or remote failure.
pub const EXIT_FAILURE: u8 = 1;
/// Configuration or validation error. Matches clap's usage-error status.
pub const EXIT_USAGE: u8 = 2;
/// User cancellation (128 + SIGINT, the shell convention).
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Error)]
pub enum AskError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AskError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Exit status the process should terminate with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) | Self::Validation { .. } => EXIT_USAGE,
            Self::Cancelled(_) => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }

    /// Message for stderr. Keeps the status code and provider detail but
    /// never echoes the API key.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => msg.clone(),
            Self::Validation { field, message } => format!("invalid {field}: {message}"),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Cancelled(_) => "request cancelled".to_string(),
            Self::RateLimited { provider } => {
                format!("rate limited by {provider}, try again shortly")
            }
            Self::Upstream {
                provider, message, ..
            } => format!("upstream error from {provider}: {message}"),
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}")
            }
            Self::SchemaParse(msg) => format!("failed to parse provider response: {msg}"),
            Self::Request(e) => {
                if e.is_connect() {
                    format!("could not connect to provider: {e}")
                } else {
                    format!("request to provider failed: {e}")
                }
            }
            Self::Output(e) => format!("failed to write output: {e}"),
            Self::Other(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_FAILURE, EXIT_USAGE, EXIT_CANCELLED];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn errors_map_to_their_exit_class() {
        assert_eq!(AskError::Configuration("x".into()).exit_code(), EXIT_USAGE);
        assert_eq!(AskError::validation("temperature", "x").exit_code(), EXIT_USAGE);
        assert_eq!(AskError::Cancelled(10).exit_code(), EXIT_CANCELLED);
        assert_eq!(AskError::Timeout(10).exit_code(), EXIT_FAILURE);
        assert_eq!(
            AskError::Upstream {
                provider: "openrouter".into(),
                message: "500".into(),
                status: Some(500),
            }
            .exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(AskError::SchemaParse("bad".into()).exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn upstream_message_keeps_status_detail() {
        let err = AskError::Upstream {
            provider: "openrouter".into(),
            message: "502 Bad Gateway: upstream down".into(),
            status: Some(502),
        };
        assert!(err.user_message().contains("502"));
    }
}
