use async_trait::async_trait;
use thiserror::Error;

use crate::types::{GenerationRequest, GenerationResponse};

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("Inference service unavailable: {0}")]
    Unavailable(String),

    #[error("Inference timed out: {0}")]
    Timeout(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LLMError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LLMError::Timeout(error.to_string())
        } else if error.is_connect() {
            LLMError::Unavailable(error.to_string())
        } else {
            LLMError::Http(error)
        }
    }
}

impl LLMError {
    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::Unavailable(_) | LLMError::Timeout(_) | LLMError::Http(_) => true,
            LLMError::Api { status, .. } => *status == 429 || *status >= 500,
            LLMError::Json(_) | LLMError::InvalidResponse(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// A local or remote text-generation backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Run one non-streaming chat completion.
    ///
    /// `request.timeout`, when set, bounds the HTTP exchange; callers may
    /// still wrap the call in their own deadline.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Lightweight liveness check. Never errors; an unreachable backend is
    /// reported as `false`.
    async fn health(&self) -> bool;

    /// Model ids the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    /// Short provider name used in logs and health reports.
    fn name(&self) -> &str;
}

/// Turn a non-success response into [`LLMError::Api`], keeping the body
/// text as the message.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(LLMError::Api {
        status: status.as_u16(),
        message: text,
    })
}
