//! Structured `{code, message}` errors returned to callers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meshreg_state::{ErrorCode, StateError};
use meshreg_wal::WalError;
use serde::Serialize;
use thiserror::Error;

use crate::handlers::ApiResponse;

/// Result type alias for service calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error embedded in every failing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn status(&self) -> StatusCode {
        match self.code {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<WalError> for ApiError {
    fn from(e: WalError) -> Self {
        let code = match e {
            WalError::Closed | WalError::Io(_) => ErrorCode::Unavailable,
            WalError::Apply { ref source, .. } => source.code(),
            _ => ErrorCode::Internal,
        };
        Self::new(code, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ApiResponse::<()>::err(self))).into_response()
    }
}
