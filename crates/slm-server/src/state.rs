use std::sync::Arc;

use slm_core::{ContextWindowPolicy, ConversationStore};
use slm_llm::InferenceProvider;
use slm_loop::{ChatConfig, ChatOrchestrator};

pub const API_VERSION: &str = "v1";

/// Shared state handed to every actix worker.
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn InferenceProvider>,
        policy: Arc<ContextWindowPolicy>,
        config: ChatConfig,
    ) -> Self {
        Self {
            orchestrator: ChatOrchestrator::new(store, provider, policy, config),
        }
    }

    pub fn store(&self) -> &dyn ConversationStore {
        self.orchestrator.store().as_ref()
    }

    pub fn provider(&self) -> &dyn InferenceProvider {
        self.orchestrator.provider().as_ref()
    }

    pub fn policy(&self) -> &ContextWindowPolicy {
        self.orchestrator.policy()
    }
}
