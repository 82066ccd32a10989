use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::context::{ContextLimits, DEFAULT_MAX_CONTEXT_BYTES, DEFAULT_MAX_FILE_BYTES};
use crate::error::AskError;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HTTP_REFERER: &str = "https://localhost";
pub const DEFAULT_APP_TITLE: &str = "codeask";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Optional TOML config file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub http_referer: Option<String>,
    pub app_title: Option<String>,
    pub max_file_bytes: Option<u64>,
    pub max_context_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, AskError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AskError::Configuration(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::parse(&contents).map_err(|e| match e {
            AskError::Configuration(msg) => {
                AskError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, AskError> {
        toml::from_str(contents)
            .map_err(|e| AskError::Configuration(format!("invalid config file: {e}")))
    }
}

/// Settings given on the command line. These win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_file_bytes: Option<u64>,
    pub max_context_bytes: Option<usize>,
}

/// Resolved runtime settings (everything except the API key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub http_referer: String,
    pub app_title: String,
    pub limits: ContextLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            http_referer: DEFAULT_HTTP_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
            limits: ContextLimits::default(),
        }
    }
}

impl Config {
    /// Layer CLI overrides over the config file over built-in defaults.
    pub fn resolve(file: FileConfig, cli: ConfigOverrides) -> Result<Self, AskError> {
        let api_url = cli
            .api_url
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
            return Err(AskError::Configuration(format!(
                "api url must start with http:// or https://, got {api_url}"
            )));
        }

        let timeout_secs = cli
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(AskError::Configuration("timeout must be at least 1 second".into()));
        }

        let limits = ContextLimits {
            max_file_bytes: cli
                .max_file_bytes
                .or(file.max_file_bytes)
                .unwrap_or(DEFAULT_MAX_FILE_BYTES),
            max_context_bytes: cli
                .max_context_bytes
                .or(file.max_context_bytes)
                .unwrap_or(DEFAULT_MAX_CONTEXT_BYTES),
        };
        if limits.max_file_bytes == 0 || limits.max_context_bytes == 0 {
            return Err(AskError::Configuration(
                "context size limits must be greater than zero".into(),
            ));
        }

        Ok(Self {
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            http_referer: file
                .http_referer
                .unwrap_or_else(|| DEFAULT_HTTP_REFERER.to_string()),
            app_title: file
                .app_title
                .unwrap_or_else(|| DEFAULT_APP_TITLE.to_string()),
            limits,
        })
    }
}

/// Resolve the API key: explicit flag first, then the environment.
/// `env` is injected so callers decide where the environment comes from.
pub fn resolve_api_key(
    explicit: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, AskError> {
    explicit
        .filter(|k| !k.trim().is_empty())
        .or_else(|| env(API_KEY_ENV).filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| {
            AskError::Configuration(format!(
                "API key is required. Set it via --api-key or the {API_KEY_ENV} \
                 environment variable."
            ))
        })
}
