use slm_core::StoreError;
use slm_llm::LLMError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Inference service unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Inference timed out: {0}")]
    InferenceTimeout(String),

    #[error("Inference failed: {message}")]
    InferenceFailed { message: String, retryable: bool },

    #[error("Failed to save conversation: {0}")]
    StoreWriteFailure(String),

    #[error("Failed to read conversation: {0}")]
    StoreReadFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    #[error("Conversation already exists: {0}")]
    AlreadyExists(String),

    #[error("Nothing to retry: {0}")]
    NothingToRetry(String),
}

impl ChatError {
    /// Whether the same request may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::InferenceUnavailable(_)
            | ChatError::InferenceTimeout(_)
            | ChatError::StoreWriteFailure(_)
            | ChatError::StoreReadFailure(_) => true,
            ChatError::InferenceFailed { retryable, .. } => *retryable,
            ChatError::NotFound(_)
            | ChatError::InvalidInput(_)
            | ChatError::InvalidTurn(_)
            | ChatError::AlreadyExists(_)
            | ChatError::NothingToRetry(_) => false,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ChatError::NotFound(id),
            StoreError::AlreadyExists(id) => ChatError::AlreadyExists(id),
            StoreError::InvalidTurn(message) => ChatError::InvalidTurn(message),
            StoreError::InvalidData(message) => ChatError::InvalidInput(message),
            StoreError::WriteFailure(message) => ChatError::StoreWriteFailure(message),
            StoreError::ReadFailure(message) => ChatError::StoreReadFailure(message),
        }
    }
}

impl From<LLMError> for ChatError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Unavailable(message) => ChatError::InferenceUnavailable(message),
            LLMError::Timeout(message) => ChatError::InferenceTimeout(message),
            other => ChatError::InferenceFailed {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
