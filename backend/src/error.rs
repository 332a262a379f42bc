//! Error handling for the Business Onboarding service
//!
//! Every failure is a variant of [`AppError`]; the variant alone decides the
//! HTTP status and the error code placed in the response envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::{ApiResponse, ValidationError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Caller input errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Expired: {0}")]
    Expired(String),

    // Authentication errors
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Business rule errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // External service errors
    #[error("Identity provider rejected the request: {0}")]
    IdentityRejected(String),

    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    #[error("Email delivery failed: {0}")]
    EmailDelivery(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::Expired(_)
            | AppError::IdentityRejected(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::IdentityProvider(_)
            | AppError::EmailDelivery(_)
            | AppError::Database(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Expired(_) => "INVITATION_EXPIRED",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::IdentityRejected(_) => "IDENTITY_REJECTED",
            AppError::IdentityProvider(_) => "IDENTITY_PROVIDER_ERROR",
            AppError::EmailDelivery(_) => "EMAIL_DELIVERY_FAILED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(err) => err.to_string(),
            AppError::BadRequest(msg)
            | AppError::Expired(msg)
            | AppError::Unauthenticated(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::IdentityRejected(msg)
            | AppError::IdentityProvider(msg) => msg.clone(),
            AppError::EmailDelivery(msg) => format!("Failed to send invitation email: {}", msg),
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Configuration(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Error: {:?}", self);
        } else {
            tracing::warn!(code = self.code(), "Request rejected: {}", self);
        }

        let body = ApiResponse::failure(self.code(), self.public_message());
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
