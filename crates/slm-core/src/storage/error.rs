use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    #[error("Invalid conversation data: {0}")]
    InvalidData(String),

    #[error("Storage write failed: {0}")]
    WriteFailure(String),

    #[error("Storage read failed: {0}")]
    ReadFailure(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
