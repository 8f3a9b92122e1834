use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::budget::limits::ContextWindowPolicy;
use crate::conversation::{Conversation, ConversationSummary, NewConversation, Turn};
use crate::storage::{
    normalize_title, prepare_import, sort_summaries, ConversationStore, StoreError, StoreResult,
};

/// Process-local store.
///
/// Each mutation holds the entry's shard lock for its whole (synchronous)
/// duration, so appends to one conversation are serialized and readers see
/// either the old or the new turn list.
pub struct InMemoryConversationStore {
    conversations: DashMap<String, Conversation>,
    policy: Arc<ContextWindowPolicy>,
}

impl InMemoryConversationStore {
    pub fn new(policy: Arc<ContextWindowPolicy>) -> Self {
        Self {
            conversations: DashMap::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(Arc::new(ContextWindowPolicy::default()))
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_with(&self, request: NewConversation) -> StoreResult<Conversation> {
        let conversation = request.build(&self.policy)?;
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append(&self, conversation_id: &str, turn: Turn) -> StoreResult<Conversation> {
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        entry.add_turn(turn)?;
        Ok(entry.clone())
    }

    async fn get(&self, conversation_id: &str) -> StoreResult<Conversation> {
        self.conversations
            .get(conversation_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .iter()
            .map(|entry| entry.summary())
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, conversation_id: &str) -> StoreResult<bool> {
        Ok(self.conversations.remove(conversation_id).is_some())
    }

    async fn rename(&self, conversation_id: &str, title: &str) -> StoreResult<Conversation> {
        let title = normalize_title(title)?;
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        entry.title = title;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn import(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let conversation = prepare_import(conversation)?;
        match self.conversations.entry(conversation.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(conversation.id)),
            Entry::Vacant(entry) => {
                entry.insert(conversation.clone());
                Ok(conversation)
            }
        }
    }
}
