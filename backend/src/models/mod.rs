//! Database models for the Business Onboarding service
//!
//! Re-exports models from the shared crate and adds backend-specific models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use shared::models::*;

/// Purpose of an outbound email
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "email_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    AdminInvitation,
    TeamInvitation,
    InvitationResend,
}

impl EmailKind {
    /// Resend failures are reported to the caller, so the worker leaves them
    pub fn is_retryable(self) -> bool {
        !matches!(self, EmailKind::InvitationResend)
    }
}

/// Delivery state of an outbox message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

/// Durable record of an email the workflow intends to deliver
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub kind: EmailKind,
    pub invitation_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub from_address: String,
    pub reply_to: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Input for recording an outbox message
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub kind: EmailKind,
    pub invitation_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub from_address: String,
    pub reply_to: String,
}
