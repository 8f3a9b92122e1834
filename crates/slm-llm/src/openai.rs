use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::provider::{check_status, InferenceProvider, LLMError, Result};
use crate::types::{GenerationRequest, GenerationResponse, PromptMessage, ProviderUsage};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for OpenAI-compatible `/chat/completions` servers (llama.cpp,
/// vLLM, LM Studio, or the hosted API).
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    health_timeout: Duration,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            health_timeout: HEALTH_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn fetch_models(&self) -> Result<OpenAIModelsResponse> {
        let builder = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(self.health_timeout);
        let response = check_status(self.authorize(builder).send().await?).await?;
        Ok(response.json::<OpenAIModelsResponse>().await?)
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for OpenAIProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let body = OpenAIChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            max_tokens: request.options.max_output_tokens,
            temperature: request.options.temperature,
        };
        log::debug!(
            "OpenAI chat request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = check_status(self.authorize(builder).send().await?).await?;
        let bytes = response.bytes().await?;
        let completion: OpenAIChatResponse = serde_json::from_slice(&bytes)?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(LLMError::InvalidResponse(
                "response has no choices".to_string(),
            ));
        };

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            usage: completion.usage.map(|usage| ProviderUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }),
        })
    }

    async fn health(&self) -> bool {
        match self.fetch_models().await {
            Ok(_) => true,
            Err(error) => {
                log::debug!("OpenAI-compatible health check failed: {}", error);
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let models = self.fetch_models().await?;
        Ok(models.data.into_iter().map(|model| model.id).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelsResponse {
    #[serde(default)]
    data: Vec<OpenAIModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModel {
    id: String,
}
