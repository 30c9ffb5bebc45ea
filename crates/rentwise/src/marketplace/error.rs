use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::domain::UnknownVariant;
use super::store::StoreError;

/// Error raised by every marketplace operation. Each variant maps to a stable
/// code and HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketplaceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketplaceError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            MarketplaceError::NotFound(_) => "NOT_FOUND",
            MarketplaceError::Forbidden(_) => "FORBIDDEN",
            MarketplaceError::Conflict(_) => "CONFLICT",
            MarketplaceError::InvalidState(_) => "INVALID_STATE",
            MarketplaceError::Validation(_) => "VALIDATION_ERROR",
            MarketplaceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            MarketplaceError::Unavailable(_) => "UNAVAILABLE",
            MarketplaceError::Timeout => "TIMEOUT",
            MarketplaceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketplaceError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketplaceError::Conflict(_) => StatusCode::CONFLICT,
            MarketplaceError::InvalidState(_) => StatusCode::CONFLICT,
            MarketplaceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketplaceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            MarketplaceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MarketplaceError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            MarketplaceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to callers; internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            MarketplaceError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for MarketplaceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(collection, id) => {
                Self::NotFound(format!("{} record '{id}'", collection.label()))
            }
            StoreError::Conflict(_) | StoreError::PredicateFailed(_, _) => {
                Self::Conflict(value.to_string())
            }
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
            StoreError::Timeout => Self::Timeout,
            StoreError::Corrupt(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<UnknownVariant> for MarketplaceError {
    fn from(value: UnknownVariant) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: &'static str,
    message: String,
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        if matches!(
            self,
            MarketplaceError::Internal(_) | MarketplaceError::Unavailable(_)
        ) {
            tracing::error!(error = %self, code = self.code(), "marketplace operation failed");
        }

        let body = ErrorBody {
            error: ErrorDetails {
                code: self.code(),
                message: self.public_message(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}
