use std::time::Duration;

use slm_llm::GenerationOptions;

/// Default bound on a single generation call.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the chat orchestrator.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Upper bound on one inference call, health check excluded.
    pub inference_timeout: Duration,
    /// Check backend health before each generation and fail fast when it is down.
    pub health_check: bool,
    /// Leading system turn for conversations the orchestrator creates.
    pub system_prompt: Option<String>,
    pub generation: GenerationOptions,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            health_check: true,
            system_prompt: None,
            generation: GenerationOptions::default(),
        }
    }
}
