//! One chat exchange: persist the user turn, trim history to the model's
//! budget, run inference under a deadline and persist the reply.
//!
//! The user turn is written before any inference call, so a failed or timed
//! out generation leaves the message saved and [`ChatOrchestrator::retry`]
//! can complete it later without resending text.
//!
//! Exchanges on one conversation run one at a time: a `send` or `retry`
//! waits for the exchange in flight and then works on the turns it left.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use slm_core::budget::SharedTokenCounter;
use slm_core::{
    trim, ContextWindowPolicy, Conversation, ConversationStore, HeuristicTokenCounter,
    NewConversation, PromptCheck, Role, Turn,
};
use slm_llm::{GenerationRequest, GenerationResponse, InferenceProvider, PromptMessage};
use tokio::sync::Mutex;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::style::{style_analysis, word_count, StyleRequest, StyleResponse};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    /// Existing conversation; `None` starts a new one.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub text: String,
    /// Model to generate with; defaults to the conversation's model.
    #[serde(default)]
    pub model_id: Option<String>,
}

impl SendRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

/// Token accounting for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Estimated tokens of the submitted turns.
    pub prompt_tokens: u32,
    /// Estimated tokens of the reply.
    pub completion_tokens: u32,
    pub fit_without_trimming: bool,
    /// The latest turn alone exceeded the budget and was sent by itself.
    pub overflow: bool,
    pub turns_submitted: usize,
    pub turns_dropped: usize,
    pub budget: u32,
    pub context_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_completion_tokens: Option<u32>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub conversation_id: String,
    pub model_id: String,
    pub response_text: String,
    pub usage: Usage,
}

pub struct ChatOrchestrator {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn InferenceProvider>,
    policy: Arc<ContextWindowPolicy>,
    counter: SharedTokenCounter,
    config: ChatConfig,
    exchanges: DashMap<String, Arc<Mutex<()>>>,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn InferenceProvider>,
        policy: Arc<ContextWindowPolicy>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
            counter: Arc::new(HeuristicTokenCounter::default()),
            config,
            exchanges: DashMap::new(),
        }
    }

    pub fn with_counter(mut self, counter: SharedTokenCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn InferenceProvider> {
        &self.provider
    }

    pub fn policy(&self) -> &Arc<ContextWindowPolicy> {
        &self.policy
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send a user message and return the assistant's reply.
    pub async fn send(&self, request: SendRequest) -> Result<SendResponse> {
        if request.text.trim().is_empty() {
            return Err(ChatError::InvalidInput(
                "message cannot be empty".to_string(),
            ));
        }
        let requested_model = non_blank(request.model_id.as_deref());

        let conversation_id = match request.conversation_id {
            Some(conversation_id) => conversation_id,
            None => {
                let model_id = requested_model.unwrap_or_else(|| self.policy.default_model());
                let mut new_conversation = NewConversation::new(model_id);
                new_conversation.system_prompt = self.config.system_prompt.clone();
                let created = self.store.create_with(new_conversation).await?;
                log::info!(
                    "[{}] Created conversation with model {} (context limit {})",
                    created.id,
                    created.model_id,
                    created.context_limit
                );
                created.id
            }
        };

        let user_turn = Turn::with_counter(Role::User, request.text, self.counter.as_ref());
        self.exclusive(&conversation_id, async {
            let conversation = self.store.append(&conversation_id, user_turn).await?;
            let model_id = requested_model
                .map(str::to_string)
                .unwrap_or_else(|| conversation.model_id.clone());
            self.complete(conversation, model_id).await
        })
        .await
    }

    /// Generate a reply for a conversation whose last turn is an unanswered
    /// user message, without appending the message again.
    pub async fn retry(&self, conversation_id: &str, model_id: Option<&str>) -> Result<SendResponse> {
        self.exclusive(conversation_id, async {
            let conversation = self.store.get(conversation_id).await?;
            match conversation.last_turn() {
                Some(turn) if turn.role == Role::User => {}
                _ => {
                    return Err(ChatError::NothingToRetry(format!(
                        "conversation {} has no unanswered user message",
                        conversation_id
                    )));
                }
            }

            let model_id = non_blank(model_id)
                .map(str::to_string)
                .unwrap_or_else(|| conversation.model_id.clone());
            log::info!("[{}] Retrying pending user message", conversation_id);
            self.complete(conversation, model_id).await
        })
        .await
    }

    /// Generate one text in the style of the request's examples. The
    /// exchange is not persisted.
    pub async fn generate_styled(&self, request: StyleRequest) -> Result<StyleResponse> {
        if request.prompt.trim().is_empty() {
            return Err(ChatError::InvalidInput("prompt cannot be empty".to_string()));
        }
        if request.word_limit == 0 {
            return Err(ChatError::InvalidInput(
                "word limit must be at least 1".to_string(),
            ));
        }

        let model_id = non_blank(request.model_id.as_deref())
            .unwrap_or_else(|| self.policy.default_model())
            .to_string();
        let examples_used = request.usable_examples().len();
        let prompt = request.build_prompt();

        let check = self
            .policy
            .check_prompt(&model_id, &prompt, self.counter.as_ref());
        if !check.fits {
            return Err(ChatError::InvalidInput(format!(
                "style prompt needs {} tokens, more than {} allows",
                check.estimated_tokens, model_id
            )));
        }

        let generation = GenerationRequest::new(
            model_id.as_str(),
            vec![PromptMessage::new(Role::User, prompt)],
        )
        .with_options(self.config.generation.clone())
        .with_timeout(self.config.inference_timeout);

        log::debug!(
            "[style] Submitting {} tokens with {} examples to {}",
            check.estimated_tokens,
            examples_used,
            model_id
        );
        let started = Instant::now();
        let response = self.generate("style", &generation).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let generated_text = response.text.trim().to_string();
        let words = word_count(&generated_text);
        log::info!(
            "[style] Generated {} words (limit {}) with {} in {}ms",
            words,
            request.word_limit,
            model_id,
            elapsed_ms
        );

        Ok(StyleResponse {
            model_id,
            generated_text,
            word_count: words,
            style_analysis: style_analysis(words, examples_used),
            meets_word_limit: words <= request.word_limit as usize,
            examples_used,
            prompt_tokens: check.estimated_tokens,
            elapsed_ms,
        })
    }

    /// Check a single prompt against a model's window without sending it.
    pub fn check_tokens(&self, model_id: Option<&str>, text: &str) -> PromptCheck {
        let model_id = non_blank(model_id).unwrap_or_else(|| self.policy.default_model());
        self.policy
            .check_prompt(model_id, text, self.counter.as_ref())
    }

    /// Context limit to budget against: the conversation's captured limit
    /// for its own model, the policy's for any other model.
    fn context_limit(&self, conversation: &Conversation, model_id: &str) -> u32 {
        if model_id == conversation.model_id {
            conversation.context_limit
        } else {
            self.policy.limit_for(model_id)
        }
    }

    /// Run `exchange` while holding the conversation's exchange lock. The
    /// lock entry is dropped once no other exchange is waiting on it.
    async fn exclusive<T>(
        &self,
        conversation_id: &str,
        exchange: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let lock = self
            .exchanges
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _exchange = lock.lock().await;
            exchange.await
        };
        drop(lock);
        self.exchanges
            .remove_if(conversation_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    /// Check backend health if configured, then run one generation under the
    /// inference deadline.
    async fn generate(&self, label: &str, request: &GenerationRequest) -> Result<GenerationResponse> {
        if self.config.health_check && !self.provider.health().await {
            log::warn!(
                "[{}] Inference service ({}) is not running",
                label,
                self.provider.name()
            );
            return Err(ChatError::InferenceUnavailable(format!(
                "{} is not running",
                self.provider.name()
            )));
        }

        let timeout = self.config.inference_timeout;
        match tokio::time::timeout(timeout, self.provider.generate(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => {
                log::error!("[{}] Inference failed: {}", label, error);
                Err(error.into())
            }
            Err(_) => {
                log::error!("[{}] Inference exceeded {}s", label, timeout.as_secs_f64());
                Err(ChatError::InferenceTimeout(format!(
                    "no response within {:.1}s",
                    timeout.as_secs_f64()
                )))
            }
        }
    }

    async fn complete(&self, conversation: Conversation, model_id: String) -> Result<SendResponse> {
        let conversation_id = conversation.id.clone();
        let context_limit = self.context_limit(&conversation, &model_id);
        let budget = self.policy.reserve_for_response(context_limit);
        let trimmed = trim(&conversation.turns, budget);

        if trimmed.overflow {
            log::warn!(
                "[{}] Latest message ({} tokens) exceeds the {} token budget of {}; sending it alone",
                conversation_id,
                trimmed.total_tokens,
                budget,
                model_id
            );
        } else if trimmed.dropped > 0 {
            log::info!(
                "[{}] Dropped {} older turns to fit {} tokens",
                conversation_id,
                trimmed.dropped,
                budget
            );
        }

        let request = GenerationRequest::from_turns(model_id.as_str(), &trimmed.turns)
            .with_options(self.config.generation.clone())
            .with_timeout(self.config.inference_timeout);

        log::debug!(
            "[{}] Submitting {} turns ({} tokens) to {}",
            conversation_id,
            trimmed.turns.len(),
            trimmed.total_tokens,
            model_id
        );
        let started = Instant::now();
        let response = self.generate(&conversation_id, &request).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let assistant_turn =
            Turn::with_counter(Role::Assistant, response.text, self.counter.as_ref());
        let completion_tokens = assistant_turn.token_count;
        let response_text = assistant_turn.content.clone();
        self.store.append(&conversation_id, assistant_turn).await?;

        log::info!(
            "[{}] Reply generated by {} in {}ms",
            conversation_id,
            model_id,
            elapsed_ms
        );

        let provider_usage = response.usage.unwrap_or_default();
        Ok(SendResponse {
            conversation_id,
            model_id,
            response_text,
            usage: Usage {
                prompt_tokens: trimmed.total_tokens,
                completion_tokens,
                fit_without_trimming: trimmed.fit_without_trimming(),
                overflow: trimmed.overflow,
                turns_submitted: trimmed.turns.len(),
                turns_dropped: trimmed.dropped,
                budget,
                context_limit,
                provider_prompt_tokens: provider_usage.prompt_tokens,
                provider_completion_tokens: provider_usage.completion_tokens,
                elapsed_ms,
            },
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
