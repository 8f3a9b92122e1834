use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::budget::counter::{HeuristicTokenCounter, TokenCounter};
use crate::budget::limits::ContextWindowPolicy;
use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation.
///
/// `token_count` is estimated once when the turn is built and never
/// recomputed; the trimmer budgets against this stored value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub token_count: u32,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_counter(role, content, &HeuristicTokenCounter::default())
    }

    pub fn with_counter(role: Role, content: impl Into<String>, counter: &dyn TokenCounter) -> Self {
        let content = content.into();
        let token_count = counter.count_text(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            token_count,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub model_id: String,
    /// Context window captured when the conversation was created.
    pub context_limit: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(model_id: impl Into<String>, title: impl Into<String>, context_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            model_id: model_id.into(),
            context_limit,
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    /// Append a turn, rejecting a `system` turn anywhere but the head.
    pub fn add_turn(&mut self, turn: Turn) -> Result<(), StoreError> {
        check_system_position(self.turns.len(), &turn)?;
        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the turn-order invariants of a conversation built elsewhere
    /// (imports, records read back from disk).
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "conversation id cannot be empty".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "conversation model cannot be empty".to_string(),
            ));
        }
        for (position, turn) in self.turns.iter().enumerate() {
            check_system_position(position, turn)?;
        }
        Ok(())
    }

    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.first().filter(|turn| turn.role == Role::System)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn total_tokens(&self) -> u32 {
        self.turns
            .iter()
            .fold(0u32, |acc, turn| acc.saturating_add(turn.token_count))
    }

    /// Re-estimate every turn's `token_count` from its content.
    pub fn recount_tokens(&mut self, counter: &dyn TokenCounter) {
        for turn in &mut self.turns {
            turn.token_count = counter.count_text(&turn.content);
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            model_id: self.model_id.clone(),
            context_limit: self.context_limit,
            turn_count: self.turns.len(),
            total_tokens: self.total_tokens(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Reassemble a conversation from its stored metadata and turn log.
    pub fn from_parts(summary: ConversationSummary, turns: Vec<Turn>) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            model_id: summary.model_id,
            context_limit: summary.context_limit,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            turns,
        }
    }
}

fn check_system_position(position: usize, turn: &Turn) -> Result<(), StoreError> {
    if turn.role == Role::System && position > 0 {
        return Err(StoreError::InvalidTurn(format!(
            "system turn {} must be the first turn of the conversation",
            turn.id
        )));
    }
    Ok(())
}

/// Conversation metadata without turn bodies, used for directory views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub model_id: String,
    pub context_limit: u32,
    pub turn_count: usize,
    pub total_tokens: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConversation {
    pub model_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Overrides the context window resolved from the policy.
    #[serde(default)]
    pub context_limit: Option<u32>,
    /// Persisted as the leading `system` turn when present.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl NewConversation {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_context_limit(mut self, context_limit: u32) -> Self {
        self.context_limit = Some(context_limit);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Build the conversation, resolving its context limit from `policy`
    /// unless an explicit non-zero override was given.
    pub fn build(self, policy: &ContextWindowPolicy) -> Result<Conversation, StoreError> {
        let model_id = self.model_id.trim();
        if model_id.is_empty() {
            return Err(StoreError::InvalidData(
                "model id cannot be empty".to_string(),
            ));
        }

        let context_limit = self
            .context_limit
            .filter(|limit| *limit > 0)
            .unwrap_or_else(|| policy.limit_for(model_id));
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_title);

        let mut conversation = Conversation::new(model_id, title, context_limit);

        if let Some(prompt) = self
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
        {
            conversation.add_turn(Turn::system(prompt))?;
            conversation.updated_at = conversation.created_at;
        }

        Ok(conversation)
    }
}

/// Title given to conversations created without one, e.g. `Chat 2024-05-01 14:03`.
pub fn default_title() -> String {
    format!("Chat {}", Local::now().format("%Y-%m-%d %H:%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::limits::{ModelProfile, ModelsConfig};

    fn policy_with(model: &str, window: u32) -> ContextWindowPolicy {
        ContextWindowPolicy::new(ModelsConfig {
            available_models: vec![ModelProfile::new(model, model, window)],
            default_model: Some(model.to_string()),
        })
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn role_rejects_unknown_strings() {
        let parsed: Result<Role, _> = serde_json::from_str("\"tool\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn turn_estimates_tokens_at_construction() {
        let turn = Turn::user("Hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.token_count, 2);
        assert!(!turn.id.is_empty());
    }

    #[test]
    fn add_turn_updates_timestamp() {
        let mut conversation = Conversation::new("m", "t", 100);
        let before = conversation.updated_at;
        conversation.add_turn(Turn::user("hi")).unwrap();
        assert_eq!(conversation.turns.len(), 1);
        assert!(conversation.updated_at >= before);
    }

    #[test]
    fn add_turn_rejects_late_system_turn() {
        let mut conversation = Conversation::new("m", "t", 100);
        conversation.add_turn(Turn::user("hi")).unwrap();

        let result = conversation.add_turn(Turn::system("late"));

        assert!(matches!(result, Err(StoreError::InvalidTurn(_))));
        assert_eq!(conversation.turns.len(), 1);
    }

    #[test]
    fn add_turn_accepts_leading_system_and_irregular_order() {
        let mut conversation = Conversation::new("m", "t", 100);
        conversation.add_turn(Turn::system("be brief")).unwrap();
        conversation.add_turn(Turn::user("one")).unwrap();
        conversation.add_turn(Turn::user("two")).unwrap();

        assert_eq!(conversation.system_turn().unwrap().content, "be brief");
        assert_eq!(conversation.last_turn().unwrap().content, "two");
    }

    #[test]
    fn validate_detects_misplaced_system_turn() {
        let mut conversation = Conversation::new("m", "t", 100);
        conversation.turns = vec![Turn::user("a"), Turn::system("b")];
        assert!(matches!(conversation.validate(), Err(StoreError::InvalidTurn(_))));
    }

    #[test]
    fn summary_counts_turns_and_tokens() {
        let mut conversation = Conversation::new("m", "t", 100);
        conversation.add_turn(Turn::user("Hello")).unwrap();
        conversation.add_turn(Turn::assistant("Hello, world!")).unwrap();

        let summary = conversation.summary();

        assert_eq!(summary.turn_count, 2);
        assert_eq!(summary.total_tokens, 2 + 4);
        assert_eq!(summary.id, conversation.id);
    }

    #[test]
    fn new_conversation_resolves_limit_from_policy() {
        let policy = policy_with("modelA", 100);
        let conversation = NewConversation::new("modelA")
            .with_title("Test")
            .build(&policy)
            .unwrap();

        assert_eq!(conversation.context_limit, 100);
        assert_eq!(conversation.title, "Test");
        assert!(conversation.turns.is_empty());
    }

    #[test]
    fn new_conversation_honors_limit_override() {
        let policy = policy_with("modelA", 100);
        let conversation = NewConversation::new("modelA")
            .with_context_limit(2048)
            .build(&policy)
            .unwrap();
        assert_eq!(conversation.context_limit, 2048);
    }

    #[test]
    fn new_conversation_defaults_blank_title() {
        let policy = policy_with("modelA", 100);
        let conversation = NewConversation::new("modelA")
            .with_title("   ")
            .build(&policy)
            .unwrap();
        assert!(conversation.title.starts_with("Chat "));
    }

    #[test]
    fn new_conversation_persists_system_prompt_as_head() {
        let policy = policy_with("modelA", 100);
        let conversation = NewConversation::new("modelA")
            .with_system_prompt("You are helpful")
            .build(&policy)
            .unwrap();

        assert_eq!(conversation.turns.len(), 1);
        assert_eq!(conversation.turns[0].role, Role::System);
    }

    #[test]
    fn new_conversation_requires_model() {
        let policy = ContextWindowPolicy::default();
        let result = NewConversation::new("  ").build(&policy);
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }
}
