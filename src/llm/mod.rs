//! Completion provider
//!
//! This module provides:
//! - A trait for chat backends (one request, one attempt)
//! - An OpenAI-compatible HTTP backend for locally hosted models
//! - [`CompletionProvider`], which adds the configured model, per-call
//!   timeouts and the shared retry policy, and returns a failure sentinel
//!   instead of an error once the attempt budget is spent

mod http_backend;
pub mod json;
mod retry;
pub mod tokens;

pub use http_backend::*;
pub use retry::*;
pub use tokens::{count_tokens, TokenCounter};

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One request to a chat backend
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    /// Text of the final (user) message
    pub fn prompt(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Raw backend reply
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Trait for chat completion backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one request; no retries
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Whether the backend server answers at all
    async fn check_connection(&self) -> bool;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Finished,
    MaxOutputReached,
    Error,
}

impl FinishReason {
    /// Classify a backend's raw finish reason
    pub fn from_backend(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("length") | Some("max_tokens") => FinishReason::MaxOutputReached,
            Some("error") => FinishReason::Error,
            _ => FinishReason::Finished,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Finished => write!(f, "finished"),
            FinishReason::MaxOutputReached => write!(f, "max_output_reached"),
            FinishReason::Error => write!(f, "error"),
        }
    }
}

/// Outcome of a completion call
///
/// A spent retry budget is not an `Err`: it comes back as the sentinel
/// (`text == "Error"`, `finish_reason == Error`, `exhausted`). `attempts` is
/// zero when the call was never made. A backend reply that merely reports an
/// `error` finish reason is not the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub attempts: u32,
    /// No usable reply within the retry budget
    pub exhausted: bool,
}

impl Completion {
    /// Sentinel text of a failed completion
    pub const FAILURE_TEXT: &'static str = "Error";

    pub fn failed(attempts: u32) -> Self {
        Self {
            text: Self::FAILURE_TEXT.to_string(),
            finish_reason: FinishReason::Error,
            attempts,
            exhausted: true,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.exhausted
    }

    /// Text of a usable completion
    pub fn text(&self) -> Option<&str> {
        if self.is_failure() {
            None
        } else {
            Some(&self.text)
        }
    }
}

/// Typed reply to a prompt that asks for JSON
#[derive(Debug)]
pub enum JsonReply<T> {
    Parsed(T),
    /// The model answered, but never with usable JSON
    Unparsable(String),
    /// The completion itself failed after all retries
    Exhausted,
}

impl<T> JsonReply<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, JsonReply::Parsed(_))
    }
}

/// Completion provider bound to one deployment model
pub struct CompletionProvider {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: f32,
    policy: RetryPolicy,
    call_timeout: Duration,
    tokens: TokenCounter,
}

impl CompletionProvider {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &CompletionConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            policy: RetryPolicy::new(config.max_attempts, config.retry_delay()),
            call_timeout: config.timeout(),
            tokens: TokenCounter::resolve(&config.model, config.tokenizer_path.as_deref()),
        }
    }

    /// Provider talking to the configured OpenAI-compatible endpoint
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        let backend = OpenAiCompatibleBackend::new(config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    /// The configured model; any other requested id is overridden
    pub fn resolve_model(&self, requested: Option<&str>) -> &str {
        if let Some(requested) = requested {
            if !requested.is_empty() && requested != self.model {
                warn!(
                    "Model '{}' requested but '{}' is provisioned; using '{}'",
                    requested, self.model, self.model
                );
            }
        }
        &self.model
    }

    pub fn token_counter(&self) -> &TokenCounter {
        &self.tokens
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokens.count(text)
    }

    pub fn truncate_to_tokens<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        self.tokens.truncate(text, limit)
    }

    fn build_request(&self, model: Option<&str>, prompt: &str, history: &[ChatMessage]) -> ChatRequest {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(prompt));
        ChatRequest {
            model: self.resolve_model(model).to_string(),
            messages,
            temperature: self.temperature,
        }
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match tokio::time::timeout(self.call_timeout, self.backend.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.call_timeout.as_secs())),
        }
    }

    async fn run(&self, request: ChatRequest, retry_error_finish: bool) -> Completion {
        let outcome = self
            .policy
            .run(
                |_| {
                    let request = &request;
                    async move {
                        let response = self.attempt(request).await?;
                        let reason = FinishReason::from_backend(response.finish_reason.as_deref());
                        if retry_error_finish && reason == FinishReason::Error {
                            return Err(Error::Completion(
                                "backend reported an error finish reason".to_string(),
                            ));
                        }
                        Ok((response.content, reason))
                    }
                },
                retry_unless_cancelled,
            )
            .await;

        match outcome.result {
            Ok((text, finish_reason)) => Completion {
                text,
                finish_reason,
                attempts: outcome.attempts,
                exhausted: false,
            },
            Err(e) => {
                error!(
                    "Max retries reached for prompt: {} ({})",
                    prompt_preview(request.prompt()),
                    e
                );
                Completion::failed(outcome.attempts)
            }
        }
    }

    /// Single-turn completion (async)
    pub async fn complete(
        &self,
        model: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Completion {
        let request = self.build_request(model, prompt, history);
        self.run(request, false).await
    }

    /// Single-turn completion that also retries on an error finish reason
    pub async fn complete_with_finish_reason(
        &self,
        model: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Completion {
        let request = self.build_request(model, prompt, history);
        self.run(request, true).await
    }

    /// Ask for a JSON object and deserialize it.
    ///
    /// Error finish reasons consume the retry budget. Unparsable replies are
    /// asked again up to `parse_attempts` times; an exhausted completion ends
    /// the exchange immediately.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        parse_attempts: u32,
    ) -> JsonReply<T> {
        let parse_attempts = parse_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=parse_attempts {
            let completion = self.complete_with_finish_reason(None, prompt, &[]).await;
            if completion.is_failure() {
                return JsonReply::Exhausted;
            }
            match json::parse_model_json::<T>(&completion.text) {
                Ok(value) => return JsonReply::Parsed(value),
                Err(e) => {
                    warn!(
                        "Unparsable model reply ({}/{}): {}",
                        attempt, parse_attempts, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        JsonReply::Unparsable(last_error)
    }

    /// Blocking single-turn completion for synchronous callers.
    ///
    /// Drives its own current-thread runtime, so it must not be called from
    /// inside an async context.
    pub fn complete_blocking(
        &self,
        model: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Completion {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to start runtime for blocking completion: {}", e);
                return Completion::failed(0);
            }
        };
        runtime.block_on(self.complete(model, prompt, history))
    }
}

fn prompt_preview(prompt: &str) -> String {
    let mut end = prompt.len().min(100);
    while !prompt.is_char_boundary(end) {
        end -= 1;
    }
    prompt[..end].replace('\n', " ")
}
