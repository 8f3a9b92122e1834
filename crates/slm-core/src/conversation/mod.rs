pub mod types;

pub use types::{default_title, Conversation, ConversationSummary, NewConversation, Role, Turn};
