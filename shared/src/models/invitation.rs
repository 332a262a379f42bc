//! Invitation model and lifecycle rules
//!
//! An invitation moves `pending -> accepted` or `pending -> expired`; both
//! targets are terminal. Expiry is lazy: a row past its `expires_at` keeps
//! reading as `pending` until an operation touches it and persists the
//! transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BusinessRole;
use crate::types::normalize_email;

/// Days an invitation stays acceptable after it is issued
pub const INVITATION_VALIDITY_DAYS: i64 = 7;

/// Expiry timestamp for an invitation issued at `issued_at`
pub fn invitation_expiry(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::days(INVITATION_VALIDITY_DAYS)
}

/// Invitation status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "invitation_status", rename_all = "snake_case")
)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }

    /// Transitions are one-way out of `pending`
    pub fn can_transition_to(self, next: InvitationStatus) -> bool {
        matches!(
            (self, next),
            (InvitationStatus::Pending, InvitationStatus::Accepted)
                | (InvitationStatus::Pending, InvitationStatus::Expired)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending or settled grant of account access to a business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invitation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: BusinessRole,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub resent_count: i32,
    pub last_resent_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting an invitation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewInvitation {
    pub business_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: BusinessRole,
    pub expires_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl NewInvitation {
    /// Build a pending invitation issued at `issued_at`
    pub fn issue(
        business_id: Uuid,
        email: &str,
        role: BusinessRole,
        issued_at: DateTime<Utc>,
        created_by: Option<Uuid>,
    ) -> Self {
        Self {
            business_id,
            email: normalize_email(email),
            first_name: None,
            last_name: None,
            role,
            expires_at: invitation_expiry(issued_at),
            created_by,
        }
    }

    pub fn with_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self.last_name = Some(last_name.to_string());
        self
    }
}

/// Why an invitation cannot be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceRejection {
    NotPending,
    EmailMismatch,
    /// The invitation must be persisted as `expired` before rejecting
    Expired,
}

/// Why an invitation cannot be resent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendRejection {
    NotPending,
    Expired,
}

impl Invitation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Pending and not yet past its expiry
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }

    pub fn email_matches(&self, email: &str) -> bool {
        normalize_email(&self.email) == normalize_email(email)
    }

    /// Checks run in order: status, email, then expiry
    pub fn check_acceptance(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AcceptanceRejection> {
        if self.status != InvitationStatus::Pending {
            return Err(AcceptanceRejection::NotPending);
        }
        if !self.email_matches(email) {
            return Err(AcceptanceRejection::EmailMismatch);
        }
        if self.is_expired_at(now) {
            return Err(AcceptanceRejection::Expired);
        }
        Ok(())
    }

    pub fn check_resend(&self, now: DateTime<Utc>) -> Result<(), ResendRejection> {
        if self.status != InvitationStatus::Pending {
            return Err(ResendRejection::NotPending);
        }
        if self.is_expired_at(now) {
            return Err(ResendRejection::Expired);
        }
        Ok(())
    }

    pub fn invitee_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.to_string()),
            _ => None,
        }
    }
}

/// Invitation as returned to API callers, with expiry evaluated at read time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub is_expired: bool,
}

impl InvitationView {
    pub fn at(invitation: Invitation, now: DateTime<Utc>) -> Self {
        let is_expired = invitation.status == InvitationStatus::Expired
            || (invitation.status == InvitationStatus::Pending && invitation.is_expired_at(now));
        Self {
            invitation,
            is_expired,
        }
    }
}
