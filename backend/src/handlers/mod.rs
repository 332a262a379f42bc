//! HTTP handlers for the Business Onboarding service

use shared::ValidationError;

use crate::error::{AppError, AppResult};

pub mod business;
pub mod health;
pub mod invitation;

pub use business::create_business;
pub use health::health_check;
pub use invitation::{accept_invitation, list_business_invitations, send_invitation};

/// Parse a request body so malformed JSON gets the standard error envelope
pub(crate) fn parse_json(body: &[u8]) -> AppResult<serde_json::Value> {
    if body.is_empty() {
        return Err(ValidationError::new("request body is required").into());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::from(ValidationError::new(format!("invalid JSON body: {}", e))))
}
