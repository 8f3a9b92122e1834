use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::provider::{check_status, InferenceProvider, LLMError, Result};
use crate::types::{GenerationRequest, GenerationResponse, PromptMessage, ProviderUsage};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a local Ollama daemon.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    health_timeout: Duration,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            health_timeout: HEALTH_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request_body<'a>(&self, request: &'a GenerationRequest) -> OllamaChatRequest<'a> {
        let options = OllamaOptions {
            num_predict: request.options.max_output_tokens,
            temperature: request.options.temperature,
        };
        OllamaChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            options: (!options.is_empty()).then_some(options),
        }
    }

    async fn fetch_tags(&self) -> Result<OllamaTagsResponse> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<OllamaTagsResponse>().await?)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let body = self.build_request_body(request);
        log::debug!(
            "Ollama chat request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let mut builder = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = check_status(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        let chat: OllamaChatResponse = serde_json::from_slice(&bytes)?;

        if let Some(error) = chat.error {
            return Err(LLMError::InvalidResponse(error));
        }
        let Some(message) = chat.message else {
            return Err(LLMError::InvalidResponse(
                "response has no message".to_string(),
            ));
        };

        let usage = match (chat.prompt_eval_count, chat.eval_count) {
            (None, None) => None,
            (prompt_tokens, completion_tokens) => Some(ProviderUsage {
                prompt_tokens,
                completion_tokens,
            }),
        };

        Ok(GenerationResponse {
            text: message.content,
            usage,
        })
    }

    async fn health(&self) -> bool {
        match self.fetch_tags().await {
            Ok(_) => true,
            Err(error) => {
                log::debug!("Ollama health check failed: {}", error);
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let tags = self.fetch_tags().await?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.num_predict.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    error: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}
