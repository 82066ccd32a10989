pub mod http;

use std::fmt;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::http::HttpDispatch;
use crate::error::AskError;
use crate::request::Request;
use crate::response::Completion;
use crate::signals::SignalGuard;

/// Everything the executor needs to talk to the endpoint. Built once from
/// resolved configuration; nothing is read from the environment later.
#[derive(Clone)]
pub struct ExecutorConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub http_referer: String,
    pub app_title: String,
    /// Install SIGINT/SIGTERM/SIGHUP handlers while a request is in flight.
    pub handle_signals: bool,
}

impl ExecutorConfig {
    pub fn new(config: &Config, api_key: String) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key,
            timeout: config.timeout,
            http_referer: config.http_referer.clone(),
            app_title: config.app_title.clone(),
            handle_signals: true,
        }
    }
}

impl fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("http_referer", &self.http_referer)
            .field("app_title", &self.app_title)
            .field("handle_signals", &self.handle_signals)
            .finish()
    }
}

/// `Idle → Sending → {Completed, Failed, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Sending,
    Completed,
    Failed,
    Cancelled,
}

/// Sends exactly one request. The handle returned by [`Executor::dispatch`]
/// borrows the executor mutably, so a second request cannot be in flight
/// at the same time.
pub struct Executor {
    http: HttpDispatch,
    config: ExecutorConfig,
    state: RequestState,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Result<Self, AskError> {
        Ok(Self {
            http: HttpDispatch::new()?,
            config,
            state: RequestState::Idle,
        })
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Move `Idle → Sending`: install signal handlers, then start the
    /// network call on its own task.
    pub fn dispatch(
        &mut self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<RequestHandle<'_>, AskError> {
        if self.state != RequestState::Idle {
            return Err(AskError::Other(format!(
                "executor already used (state {:?})",
                self.state
            )));
        }

        let body = serde_json::to_vec(&request.payload())
            .map_err(|e| AskError::validation("payload", e.to_string()))?;
        let model = request.backend().model_id();

        let signals = if self.config.handle_signals {
            let guard = SignalGuard::install(cancel.clone()).map_err(|e| {
                AskError::Configuration(format!("failed to install signal handlers: {e}"))
            })?;
            Some(guard)
        } else {
            None
        };

        tracing::info!(
            backend = %request.backend(),
            model,
            bytes = body.len(),
            "sending request"
        );

        let http = self.http.clone();
        let config = self.config.clone();
        let task = tokio::spawn(async move { http.send(body, model, &config).await });

        self.state = RequestState::Sending;
        Ok(RequestHandle {
            state: &mut self.state,
            task: Some(task),
            cancel,
            signals,
            started: Instant::now(),
        })
    }
}

/// Ownership of the one in-flight request. Consumed by [`RequestHandle::wait`];
/// dropping it early aborts the request.
pub struct RequestHandle<'a> {
    state: &'a mut RequestState,
    task: Option<JoinHandle<Result<Completion, AskError>>>,
    cancel: CancellationToken,
    signals: Option<SignalGuard>,
    started: Instant,
}

impl RequestHandle<'_> {
    pub fn state(&self) -> RequestState {
        *self.state
    }

    /// Wait for a terminal outcome. Cancellation is checked first, so a
    /// response that races with a signal is discarded.
    pub async fn wait(mut self) -> Result<Completion, AskError> {
        let joined = match self.task.as_mut() {
            Some(task) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                joined = task => Some(joined),
            },
            None => None,
        };

        let result = match joined {
            Some(Ok(result)) => {
                self.task = None;
                result
            }
            Some(Err(join_err)) => {
                self.task = None;
                Err(AskError::Other(format!("request task failed: {join_err}")))
            }
            None => {
                if let Some(task) = self.task.take() {
                    // Dropping the request future closes its connection.
                    task.abort();
                    let _ = task.await;
                }
                Err(AskError::Cancelled(self.started.elapsed().as_millis() as u64))
            }
        };

        *self.state = match &result {
            Ok(_) => RequestState::Completed,
            Err(AskError::Cancelled(_)) => RequestState::Cancelled,
            Err(_) => RequestState::Failed,
        };
        // Restore signal dispositions on every terminal transition.
        self.signals = None;
        tracing::debug!(
            state = ?*self.state,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "request finished"
        );

        result
    }
}

impl Drop for RequestHandle<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            *self.state = RequestState::Cancelled;
        }
    }
}
