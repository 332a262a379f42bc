//! In-process implementation of the onboarding store
//!
//! Enforces the same uniqueness and reference rules as the PostgreSQL schema
//! and can be told to fail a specific operation once, which is how the
//! compensating paths of the workflows are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{OnboardingStore, MEMBER_EXISTS, PENDING_INVITATION_EXISTS};
use crate::error::{AppError, AppResult};
use crate::models::{
    invitation_expiry, Address, Business, BusinessRole, BusinessStatus, BusinessUser, Invitation,
    InvitationStatus, NewAddress, NewBusiness, NewBusinessUser, NewInvitation, NewOutboxMessage,
    OutboxMessage, OutboxStatus, PlatformAdmin,
};
use shared::normalize_email;

/// Store operations that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    InsertAddress,
    InsertBusiness,
    InsertInvitation,
    InsertBusinessUser,
    MarkInvitationAccepted,
    DeleteAddress,
    EnqueueEmail,
}

#[derive(Default)]
struct Tables {
    business_types: HashMap<Uuid, String>,
    addresses: HashMap<Uuid, Address>,
    businesses: HashMap<Uuid, Business>,
    invitations: Vec<Invitation>,
    business_users: Vec<BusinessUser>,
    platform_admins: HashMap<Uuid, PlatformAdmin>,
    outbox: Vec<OutboxMessage>,
    failures: HashSet<StoreOp>,
}

impl Tables {
    fn take_failure(&mut self, op: StoreOp) -> AppResult<()> {
        if self.failures.remove(&op) {
            Err(AppError::Internal(format!("injected failure: {:?}", op)))
        } else {
            Ok(())
        }
    }

    fn invitation_mut(&mut self, id: Uuid) -> Option<&mut Invitation> {
        self.invitations.iter_mut().find(|i| i.id == id)
    }
}

/// Mutex-guarded tables living for the lifetime of the value
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another test thread panicked mid-update
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: StoreOp) {
        self.tables().failures.insert(op);
    }

    pub fn add_business_type(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().business_types.insert(id, name.to_string());
        id
    }

    pub fn add_platform_admin(&self, user_id: Uuid, email: &str) {
        self.tables().platform_admins.insert(
            user_id,
            PlatformAdmin {
                user_id,
                email: normalize_email(email),
                is_active: true,
                created_at: Utc::now(),
                deleted_at: None,
            },
        );
    }

    /// Seed an active membership directly, bypassing the invitation flow
    pub fn add_member(
        &self,
        business_id: Uuid,
        user_id: Uuid,
        email: &str,
        role: BusinessRole,
    ) -> BusinessUser {
        let now = Utc::now();
        let member = BusinessUser {
            id: Uuid::new_v4(),
            business_id,
            user_id,
            role,
            first_name: "Seeded".to_string(),
            last_name: "Member".to_string(),
            email: normalize_email(email),
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.tables().business_users.push(member.clone());
        member
    }

    /// Move an invitation's issue time into the past, keeping the 7-day window
    pub fn backdate_invitation(&self, id: Uuid, issued_at: DateTime<Utc>) {
        if let Some(invitation) = self.tables().invitation_mut(id) {
            invitation.created_at = issued_at;
            invitation.expires_at = invitation_expiry(issued_at);
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.tables().addresses.values().cloned().collect()
    }

    pub fn businesses(&self) -> Vec<Business> {
        self.tables().businesses.values().cloned().collect()
    }

    pub fn invitations(&self) -> Vec<Invitation> {
        self.tables().invitations.clone()
    }

    pub fn business_users(&self) -> Vec<BusinessUser> {
        self.tables().business_users.clone()
    }

    pub fn outbox(&self) -> Vec<OutboxMessage> {
        self.tables().outbox.clone()
    }
}

#[async_trait]
impl OnboardingStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_address(&self, address: NewAddress) -> AppResult<Address> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::InsertAddress)?;

        let now = Utc::now();
        let address = Address {
            id: Uuid::new_v4(),
            address_line_1: address.address_line_1,
            address_line_2: address.address_line_2,
            city: address.city,
            country: address.country,
            postal_code: address.postal_code,
            latitude: address.latitude,
            longitude: address.longitude,
            is_verified: false,
            created_by: address.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.addresses.insert(address.id, address.clone());
        Ok(address)
    }

    async fn delete_address(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::DeleteAddress)?;
        tables.addresses.remove(&id);
        Ok(())
    }

    async fn insert_business(&self, business: NewBusiness) -> AppResult<Business> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::InsertBusiness)?;

        if !tables.business_types.contains_key(&business.business_type_id) {
            return Err(AppError::BadRequest(
                "business_type_id does not reference a known business type".to_string(),
            ));
        }
        if !business.satisfies_invariants() {
            return Err(AppError::Internal(
                "businesses check constraint violated".to_string(),
            ));
        }

        let now = Utc::now();
        let business = Business {
            id: Uuid::new_v4(),
            name: business.name,
            business_type_id: business.business_type_id,
            address_id: business.address_id,
            license_number: business.license_number,
            pdv_number: business.pdv_number,
            tax_id: business.tax_id,
            company_number: business.company_number,
            is_pdv_registered: business.is_pdv_registered,
            accepts_bookings: business.accepts_bookings,
            default_booking_commission: business.default_booking_commission,
            status: BusinessStatus::Active,
            created_by: business.created_by,
            updated_by: business.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.businesses.insert(business.id, business.clone());
        Ok(business)
    }

    async fn get_business(&self, id: Uuid) -> AppResult<Option<Business>> {
        Ok(self
            .tables()
            .businesses
            .get(&id)
            .filter(|b| b.deleted_at.is_none())
            .cloned())
    }

    async fn business_type_name(&self, id: Uuid) -> AppResult<Option<String>> {
        Ok(self.tables().business_types.get(&id).cloned())
    }

    async fn insert_invitation(&self, invitation: NewInvitation) -> AppResult<Invitation> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::InsertInvitation)?;

        let email = normalize_email(&invitation.email);
        let duplicate = tables.invitations.iter().any(|i| {
            i.business_id == invitation.business_id
                && i.status == InvitationStatus::Pending
                && normalize_email(&i.email) == email
        });
        if duplicate {
            return Err(AppError::Conflict(PENDING_INVITATION_EXISTS.to_string()));
        }

        // Keep creation order strictly increasing so newest-first is stable
        let now = tables
            .invitations
            .iter()
            .map(|i| i.created_at)
            .max()
            .map(|latest| std::cmp::max(Utc::now(), latest + Duration::microseconds(1)))
            .unwrap_or_else(Utc::now);

        let invitation = Invitation {
            id: Uuid::new_v4(),
            business_id: invitation.business_id,
            email,
            first_name: invitation.first_name,
            last_name: invitation.last_name,
            role: invitation.role,
            status: InvitationStatus::Pending,
            expires_at: invitation.expires_at,
            sent_at: None,
            accepted_at: None,
            resent_count: 0,
            last_resent_at: None,
            created_by: invitation.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn get_invitation(&self, id: Uuid) -> AppResult<Option<Invitation>> {
        Ok(self.tables().invitations.iter().find(|i| i.id == id).cloned())
    }

    async fn find_live_invitation(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Invitation>> {
        let email = normalize_email(email);
        Ok(self
            .tables()
            .invitations
            .iter()
            .find(|i| {
                i.business_id == business_id
                    && normalize_email(&i.email) == email
                    && i.is_live_at(now)
            })
            .cloned())
    }

    async fn expire_stale_invitations(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let email = normalize_email(email);
        let mut expired = 0;
        for invitation in self.tables().invitations.iter_mut() {
            if invitation.business_id == business_id
                && normalize_email(&invitation.email) == email
                && invitation.status == InvitationStatus::Pending
                && invitation.is_expired_at(now)
            {
                invitation.status = InvitationStatus::Expired;
                invitation.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn mark_invitation_sent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(invitation) = self
            .tables()
            .invitation_mut(id)
            .filter(|i| i.status == InvitationStatus::Pending)
        {
            invitation.sent_at = Some(at);
            invitation.updated_at = at;
        }
        Ok(())
    }

    async fn record_invitation_resent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Invitation> {
        let mut tables = self.tables();
        let invitation = tables
            .invitation_mut(id)
            .filter(|i| i.status == InvitationStatus::Pending)
            .ok_or_else(|| AppError::BadRequest("Invitation is no longer pending".to_string()))?;

        invitation.resent_count += 1;
        invitation.last_resent_at = Some(at);
        invitation.sent_at = Some(at);
        invitation.updated_at = at;
        Ok(invitation.clone())
    }

    async fn mark_invitation_expired(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables();
        match tables.invitation_mut(id) {
            Some(invitation) if invitation.status == InvitationStatus::Pending => {
                invitation.status = InvitationStatus::Expired;
                invitation.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_invitation_accepted(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::MarkInvitationAccepted)?;
        match tables.invitation_mut(id) {
            Some(invitation) if invitation.status == InvitationStatus::Pending => {
                invitation.status = InvitationStatus::Accepted;
                invitation.accepted_at = Some(at);
                invitation.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_invitations(&self, business_id: Uuid) -> AppResult<Vec<Invitation>> {
        let mut invitations: Vec<Invitation> = self
            .tables()
            .invitations
            .iter()
            .filter(|i| i.business_id == business_id)
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    async fn active_member_exists(&self, business_id: Uuid, email: &str) -> AppResult<bool> {
        let email = normalize_email(email);
        Ok(self.tables().business_users.iter().any(|m| {
            m.business_id == business_id && m.is_current() && normalize_email(&m.email) == email
        }))
    }

    async fn insert_business_user(&self, user: NewBusinessUser) -> AppResult<BusinessUser> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::InsertBusinessUser)?;

        let email = normalize_email(&user.email);
        let duplicate = tables.business_users.iter().any(|m| {
            m.business_id == user.business_id && m.is_current() && normalize_email(&m.email) == email
        });
        if duplicate {
            return Err(AppError::Conflict(MEMBER_EXISTS.to_string()));
        }

        let now = Utc::now();
        let member = BusinessUser {
            id: Uuid::new_v4(),
            business_id: user.business_id,
            user_id: user.user_id,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            email,
            is_active: true,
            created_by: user.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.business_users.push(member.clone());
        Ok(member)
    }

    async fn is_platform_admin(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self
            .tables()
            .platform_admins
            .get(&user_id)
            .is_some_and(|a| a.is_active && a.deleted_at.is_none()))
    }

    async fn is_business_admin(&self, user_id: Uuid, business_id: Uuid) -> AppResult<bool> {
        Ok(self.tables().business_users.iter().any(|m| {
            m.user_id == user_id
                && m.business_id == business_id
                && m.role == BusinessRole::Admin
                && m.is_current()
        }))
    }

    async fn enqueue_email(&self, message: NewOutboxMessage) -> AppResult<OutboxMessage> {
        let mut tables = self.tables();
        tables.take_failure(StoreOp::EnqueueEmail)?;

        let now = Utc::now();
        let message = OutboxMessage {
            id: Uuid::new_v4(),
            kind: message.kind,
            invitation_id: message.invitation_id,
            recipient: message.recipient,
            subject: message.subject,
            html_body: message.html_body,
            text_body: message.text_body,
            from_address: message.from_address,
            reply_to: message.reply_to,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            provider_message_id: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
        };
        tables.outbox.push(message.clone());
        Ok(message)
    }

    async fn mark_email_sent(
        &self,
        id: Uuid,
        provider_message_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(message) = self.tables().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Sent;
            message.provider_message_id = provider_message_id;
            message.sent_at = Some(at);
            message.attempts += 1;
            message.last_error = None;
            message.updated_at = at;
        }
        Ok(())
    }

    async fn mark_email_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        if let Some(message) = self.tables().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Failed;
            message.attempts += 1;
            message.last_error = Some(error.to_string());
            message.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retryable_emails(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> AppResult<Vec<OutboxMessage>> {
        let now = Utc::now();
        let tables = self.tables();
        // Only unsent invitations that can still be accepted get their email again
        let awaiting_delivery = |invitation_id: Option<Uuid>| match invitation_id {
            None => true,
            Some(id) => tables
                .invitations
                .iter()
                .any(|i| i.id == id && i.is_live_at(now) && i.sent_at.is_none()),
        };
        let messages = tables
            .outbox
            .iter()
            .filter(|m| {
                m.status == OutboxStatus::Failed
                    && m.kind.is_retryable()
                    && m.attempts < max_attempts
                    && awaiting_delivery(m.invitation_id)
            })
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect();
        Ok(messages)
    }
}
