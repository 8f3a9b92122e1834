use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use slm_core::StoreError;
use slm_loop::ChatError;
use thiserror::Error;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Chat(error.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl ApiError {
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Chat(error) => match error {
                ChatError::NotFound(_) => "not_found",
                ChatError::InvalidInput(_) | ChatError::InvalidTurn(_) => "invalid_request",
                ChatError::NothingToRetry(_) => "nothing_to_retry",
                ChatError::AlreadyExists(_) => "conflict",
                ChatError::InferenceUnavailable(_) => "inference_unavailable",
                ChatError::InferenceTimeout(_) => "inference_timeout",
                ChatError::InferenceFailed { .. } => "inference_error",
                ChatError::StoreWriteFailure(_) | ChatError::StoreReadFailure(_) => {
                    "storage_error"
                }
            },
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Internal(_) => "api_error",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::Chat(error) => error.is_retryable(),
            ApiError::InvalidRequest(_) | ApiError::Internal(_) => false,
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
    retryable: bool,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Chat(error) => match error {
                ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                ChatError::InvalidInput(_)
                | ChatError::InvalidTurn(_)
                | ChatError::NothingToRetry(_) => StatusCode::BAD_REQUEST,
                ChatError::AlreadyExists(_) => StatusCode::CONFLICT,
                ChatError::InferenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::InferenceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ChatError::InferenceFailed { .. } => StatusCode::BAD_GATEWAY,
                ChatError::StoreWriteFailure(_) | ChatError::StoreReadFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_response = JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
                retryable: self.retryable(),
            },
        };
        HttpResponse::build(status_code).json(error_response)
    }
}
