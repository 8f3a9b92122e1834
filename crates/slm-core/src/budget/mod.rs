//! Token budget management for conversations.
//!
//! Keeps prompts inside a model's context window while preserving the most
//! recent turns of the conversation.
//!
//! # Key Components
//!
//! - [`counter`]: heuristic token estimation, pure and infallible
//! - [`limits`]: per-model context window table and prompt budgets
//! - [`trimmer`]: oldest-first eviction of turns to fit a budget

pub mod counter;
pub mod limits;
pub mod trimmer;

pub use counter::{estimate_tokens, HeuristicTokenCounter, SharedTokenCounter, TokenCounter};
pub use limits::{
    ContextWindowPolicy, ModelProfile, ModelsConfig, PromptCheck, DEFAULT_CONTEXT_LIMIT,
    KNOWN_MODEL_LIMITS, PROMPT_BUDGET_PERCENT,
};
pub use trimmer::{trim, TrimResult};
