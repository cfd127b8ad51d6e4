//! Error types for the Book Mart server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Stable numeric error codes exposed in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    Forbidden = 3,
    NotFound = 4,
    BadValue = 5,
    OutOfStock = 6,
    DuplicateLoan = 7,
    NoActiveLoan = 8,
    StoreFailure = 9,
    NotificationFailure = 10,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Duplicate loan: {0}")]
    DuplicateLoan(String),

    #[error("No active loan: {0}")]
    NoActiveLoan(String),

    /// Store fault; the operation was rolled back and may be retried.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Notification dispatch failed: {0}")]
    Notification(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_))
    }

    fn parts(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, ErrorCode::Forbidden),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::OutOfStock(_) => (StatusCode::CONFLICT, ErrorCode::OutOfStock),
            AppError::DuplicateLoan(_) => (StatusCode::CONFLICT, ErrorCode::DuplicateLoan),
            AppError::NoActiveLoan(_) => (StatusCode::CONFLICT, ErrorCode::NoActiveLoan),
            AppError::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreFailure),
            AppError::Notification(_) => (StatusCode::BAD_GATEWAY, ErrorCode::NotificationFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

/// Connection, pool and transaction faults stay retryable. Constraint
/// violations and row decoding failures are bugs, not outages.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db)
                if matches!(
                    db.kind(),
                    ErrorKind::UniqueViolation
                        | ErrorKind::ForeignKeyViolation
                        | ErrorKind::NotNullViolation
                        | ErrorKind::CheckViolation
                ) =>
            {
                AppError::Internal(format!("Constraint violated: {}", db))
            }
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => AppError::Internal(format!("Row mapping failed: {}", e)),
            _ => AppError::Database(e),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Storage temporarily unavailable, please retry".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Authentication(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::OutOfStock(msg)
            | AppError::DuplicateLoan(msg)
            | AppError::NoActiveLoan(msg)
            | AppError::Notification(msg) => msg.clone(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
