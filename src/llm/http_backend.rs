use super::{ChatBackend, ChatRequest, ChatResponse};
use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<BackendError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BackendError {
    Detailed { message: String },
    Plain(String),
}

impl BackendError {
    fn message(&self) -> &str {
        match self {
            BackendError::Detailed { message } => message,
            BackendError::Plain(message) => message,
        }
    }
}

/// Chat backend speaking the OpenAI-compatible `/chat/completions` API
/// (Ollama, llama.cpp server, vLLM, LM Studio)
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid completion backend URL: {}", e)))
    }

    /// Server root with a trailing `/v1` removed, where Ollama serves `/api/*`
    fn server_root(&self) -> Result<Url> {
        let trimmed = self
            .base_url
            .as_str()
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
        Ok(Url::parse(&format!("{}/", trimmed))?)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.endpoint("chat/completions")?;
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: false,
        };

        let mut builder = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?.error_for_status()?;
        let parsed = response.json::<ChatCompletionResponse>().await?;

        if let Some(err) = parsed.error {
            return Err(Error::Completion(err.message().to_string()));
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Completion("backend returned no choices".to_string()))?;

        debug!(
            "Completion finished with reason {:?}",
            choice.finish_reason.as_deref()
        );

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    async fn check_connection(&self) -> bool {
        let url = match self.server_root().and_then(|root| {
            root.join("api/tags")
                .map_err(|e| Error::Config(e.to_string()))
        }) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Backend connection check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
