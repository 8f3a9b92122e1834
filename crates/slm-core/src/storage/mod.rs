//! Conversation persistence.
//!
//! [`ConversationStore`] is the storage-agnostic contract the orchestrator is
//! given; [`InMemoryConversationStore`] and [`JsonlConversationStore`] are the
//! two implementations. A successful `append` is visible to any `get` issued
//! after it returns.

pub mod error;
pub mod jsonl;
pub mod memory;

use async_trait::async_trait;

use crate::budget::counter::HeuristicTokenCounter;
use crate::conversation::{Conversation, ConversationSummary, NewConversation, Turn};

pub use error::{StoreError, StoreResult};
pub use jsonl::JsonlConversationStore;
pub use memory::InMemoryConversationStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation with a fresh id and a context limit resolved
    /// from the store's policy.
    async fn create_with(&self, request: NewConversation) -> StoreResult<Conversation>;

    async fn create(&self, model_id: &str, title: &str) -> StoreResult<Conversation> {
        self.create_with(NewConversation::new(model_id).with_title(title))
            .await
    }

    /// Append a turn atomically and return the updated conversation.
    async fn append(&self, conversation_id: &str, turn: Turn) -> StoreResult<Conversation>;

    async fn get(&self, conversation_id: &str) -> StoreResult<Conversation>;

    /// Summaries ordered by last update, newest first.
    async fn list(&self) -> StoreResult<Vec<ConversationSummary>>;

    /// Remove a conversation and its turns. Returns whether anything was
    /// removed; deleting an absent conversation is not an error.
    async fn delete(&self, conversation_id: &str) -> StoreResult<bool>;

    async fn rename(&self, conversation_id: &str, title: &str) -> StoreResult<Conversation>;

    /// Insert a complete conversation, e.g. one previously exported. Turn
    /// token counts are re-estimated from content; supplied counts are ignored.
    async fn import(&self, conversation: Conversation) -> StoreResult<Conversation>;
}

pub(crate) fn sort_summaries(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn normalize_title(title: &str) -> StoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::InvalidData("title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

/// Check an imported conversation and recompute its turn estimates.
pub(crate) fn prepare_import(mut conversation: Conversation) -> StoreResult<Conversation> {
    conversation.validate()?;
    conversation.recount_tokens(&HeuristicTokenCounter::default());
    Ok(conversation)
}
