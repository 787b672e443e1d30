use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors
///
/// Each variant represents a distinct business failure; HTTP status codes
/// map naturally to these. Database and broker details are logged server
/// side and never exposed to the client.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient balance. Required: {required}, Available: {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Invalid gift card state: {0}")]
    InvalidState(String),

    #[error("Gift card is locked")]
    Locked,

    #[error("Gift card has expired")]
    Expired,

    #[error("Wrong gift card type: {0}")]
    WrongType(String),

    // Same message whether no card exists or the code is merely wrong
    #[error("Invalid gift card code")]
    InvalidCode,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Convert BalanceError to HTTP responses
///
/// This is where business errors become API responses
/// Key insight: Not all errors are 500s!
impl IntoResponse for BalanceError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            BalanceError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),

            BalanceError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            BalanceError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            BalanceError::InvalidState(_) => (StatusCode::CONFLICT, self.to_string()),

            BalanceError::Locked => (StatusCode::LOCKED, self.to_string()),

            BalanceError::Expired => (StatusCode::GONE, self.to_string()),

            BalanceError::WrongType(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            BalanceError::InvalidCode => (StatusCode::BAD_REQUEST, self.to_string()),

            BalanceError::DatabaseError(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                )
            }

            BalanceError::NotificationError(ref e) => {
                // Log but don't expose broker details to the client
                tracing::error!("Notification error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Notification publishing failed".to_string(),
                )
            }

            BalanceError::InternalError(ref e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Helper type for Results in this application
pub type BalanceResult<T> = Result<T, BalanceError>;
