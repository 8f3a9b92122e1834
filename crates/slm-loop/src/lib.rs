pub mod config;
pub mod error;
pub mod orchestrator;
pub mod style;

pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use orchestrator::{ChatOrchestrator, SendRequest, SendResponse, Usage};
pub use style::{StyleRequest, StyleResponse, DEFAULT_WORD_LIMIT, MAX_STYLE_EXAMPLES};
