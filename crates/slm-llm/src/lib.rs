pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_URL};
pub use openai::OpenAIProvider;
pub use provider::{InferenceProvider, LLMError, Result};
pub use types::{GenerationOptions, GenerationRequest, GenerationResponse, PromptMessage, ProviderUsage};
