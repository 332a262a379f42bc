//! Persistence for businesses, invitations, memberships and the email outbox
//!
//! Workflows only talk to [`OnboardingStore`]. [`PgStore`] backs the server;
//! `MemoryStore` (feature `test-util`) enforces the same constraints in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Address, Business, BusinessUser, Invitation, NewAddress, NewBusiness, NewBusinessUser,
    NewInvitation, NewOutboxMessage, OutboxMessage,
};

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryStore, StoreOp};
pub use postgres::PgStore;

/// Message returned when the pending-invitation uniqueness rule is violated
pub const PENDING_INVITATION_EXISTS: &str =
    "A pending invitation already exists for this email";

/// Message returned when the email already belongs to an active member
pub const MEMBER_EXISTS: &str = "This email already belongs to an active member of the business";

#[async_trait]
pub trait OnboardingStore: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> AppResult<()>;

    // ------------------------------------------------------------------
    // Businesses
    // ------------------------------------------------------------------

    async fn insert_address(&self, address: NewAddress) -> AppResult<Address>;

    async fn delete_address(&self, id: Uuid) -> AppResult<()>;

    async fn insert_business(&self, business: NewBusiness) -> AppResult<Business>;

    /// Non-deleted business by id
    async fn get_business(&self, id: Uuid) -> AppResult<Option<Business>>;

    async fn business_type_name(&self, id: Uuid) -> AppResult<Option<String>>;

    // ------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------

    /// Fails with `Conflict` when a pending invitation exists for the pair
    async fn insert_invitation(&self, invitation: NewInvitation) -> AppResult<Invitation>;

    async fn get_invitation(&self, id: Uuid) -> AppResult<Option<Invitation>>;

    /// Pending invitation for (business, email) whose expiry is after `now`
    async fn find_live_invitation(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Invitation>>;

    /// Persist lazy expiry for every stale pending invitation of the pair
    async fn expire_stale_invitations(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn mark_invitation_sent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Increment the resend counter and refresh the send timestamps
    async fn record_invitation_resent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Invitation>;

    /// `pending -> expired`; false when the invitation was no longer pending
    async fn mark_invitation_expired(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;

    /// `pending -> accepted`; false when the invitation was no longer pending
    async fn mark_invitation_accepted(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;

    /// All invitations of a business, newest first
    async fn list_invitations(&self, business_id: Uuid) -> AppResult<Vec<Invitation>>;

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    async fn active_member_exists(&self, business_id: Uuid, email: &str) -> AppResult<bool>;

    async fn insert_business_user(&self, user: NewBusinessUser) -> AppResult<BusinessUser>;

    async fn is_platform_admin(&self, user_id: Uuid) -> AppResult<bool>;

    async fn is_business_admin(&self, user_id: Uuid, business_id: Uuid) -> AppResult<bool>;

    // ------------------------------------------------------------------
    // Email outbox
    // ------------------------------------------------------------------

    async fn enqueue_email(&self, message: NewOutboxMessage) -> AppResult<OutboxMessage>;

    async fn mark_email_sent(
        &self,
        id: Uuid,
        provider_message_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn mark_email_failed(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// Failed messages of retryable kinds still under the attempt limit whose
    /// invitation, if any, is live and not yet delivered
    async fn retryable_emails(&self, max_attempts: i32, limit: i64)
        -> AppResult<Vec<OutboxMessage>>;
}
