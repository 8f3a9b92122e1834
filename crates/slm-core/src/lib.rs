pub mod budget;
pub mod conversation;
pub mod storage;

pub use budget::{
    estimate_tokens, trim, ContextWindowPolicy, HeuristicTokenCounter, ModelProfile, ModelsConfig,
    PromptCheck, TokenCounter, TrimResult, DEFAULT_CONTEXT_LIMIT,
};
pub use conversation::{Conversation, ConversationSummary, NewConversation, Role, Turn};
pub use storage::{
    ConversationStore, InMemoryConversationStore, JsonlConversationStore, StoreError, StoreResult,
};
