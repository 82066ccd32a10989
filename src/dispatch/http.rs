use std::time::{Duration, Instant};

use reqwest::Client;

use crate::dispatch::ExecutorConfig;
use crate::error::AskError;
use crate::response::Completion;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Characters of an error body quoted back to the user.
const MAX_ERROR_PREVIEW: usize = 2000;

pub const PROVIDER: &str = "openrouter";

#[derive(Clone)]
pub struct HttpDispatch {
    client: Client,
}

impl HttpDispatch {
    pub fn new() -> Result<Self, AskError> {
        // No idle pooling: one request per process, and an aborted request
        // must take its connection down with it.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| AskError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// POST a serialized chat payload and parse the response. The whole
    /// body is buffered and parsed before anything is returned.
    pub async fn send(
        &self,
        body: Vec<u8>,
        model: &str,
        config: &ExecutorConfig,
    ) -> Result<Completion, AskError> {
        let start = Instant::now();

        let response = self
            .client
            .post(&config.api_url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("HTTP-Referer", &config.http_referer)
            .header("X-Title", &config.app_title)
            .header("Content-Type", "application/json")
            .timeout(config.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, start))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "response headers received");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AskError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AskError::AuthFailed {
                provider: PROVIDER.to_string(),
                message: format!("{status}"),
            });
        }

        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let text = String::from_utf8_lossy(&error_bytes);
            let preview: String = text.chars().take(MAX_ERROR_PREVIEW).collect();
            return Err(AskError::Upstream {
                provider: PROVIDER.to_string(),
                message: format!("{status}: {}", preview.trim()),
                status: Some(status.as_u16()),
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(too_large(len as usize));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, start))?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(too_large(bytes.len()));
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        let completion = Completion::from_body(&bytes, PROVIDER, model, latency_ms)?;

        if let Some(usage) = completion.usage {
            tracing::info!(
                model = %completion.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }

        Ok(completion)
    }
}

fn map_reqwest_error(e: reqwest::Error, start: Instant) -> AskError {
    if e.is_timeout() {
        AskError::Timeout(start.elapsed().as_millis() as u64)
    } else {
        AskError::Request(e)
    }
}

fn too_large(len: usize) -> AskError {
    AskError::Upstream {
        provider: PROVIDER.to_string(),
        message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
        status: None,
    }
}
