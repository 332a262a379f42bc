//! Invitation lifecycle: issue, resend, accept and list
//!
//! Expiry is lazy. A pending invitation past its `expires_at` is written as
//! `expired` the next time a resend, acceptance or new invitation for the
//! same address touches it.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::access::{authorize_business_access, authorize_new_invitation};
use super::email::SendResult;
use super::saga::Saga;
use super::templates::{render_invitation, InvitationEmail};
use crate::error::{AppError, AppResult};
use crate::external::{IdentityUser, NewIdentityUser, Session};
use crate::models::{
    AcceptanceRejection, Business, BusinessRole, EmailKind, Invitation, InvitationView,
    NewBusinessUser, NewInvitation, ResendRejection,
};
use crate::store::{MEMBER_EXISTS, PENDING_INVITATION_EXISTS};
use crate::AppState;
use shared::{
    normalize_email, resend_target, validate_accept_invitation_data, validate_invitation_data,
    ValidationError,
};

pub const INVALID_INVITATION: &str = "Invalid or expired invitation";

/// Invitation together with whether its email went out
#[derive(Debug, Clone, Serialize)]
pub struct SentInvitation {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub email_sent: bool,
}

/// Which branch of send-invitation ran
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Created(SentInvitation),
    Resent(SentInvitation),
}

/// Result of accepting an invitation
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvitation {
    pub user_id: Uuid,
    pub business_id: Uuid,
    pub role: BusinessRole,
    pub session: Option<Session>,
    pub message: String,
}

pub struct InvitationService {
    state: AppState,
}

impl InvitationService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Resend when the payload names an invitation, otherwise issue a new one
    pub async fn send(
        &self,
        actor: &IdentityUser,
        input: &serde_json::Value,
    ) -> AppResult<SendOutcome> {
        match resend_target(input)? {
            Some(invitation_id) => self.resend(actor, invitation_id).await.map(SendOutcome::Resent),
            None => self.create(actor, input).await.map(SendOutcome::Created),
        }
    }

    pub async fn create(
        &self,
        actor: &IdentityUser,
        input: &serde_json::Value,
    ) -> AppResult<SentInvitation> {
        let store = &self.state.store;
        let data = validate_invitation_data(input)?;
        authorize_new_invitation(store.as_ref(), actor.id, data.business_id, data.role).await?;

        let business = self.business(data.business_id).await?;
        let email = normalize_email(&data.email);
        let now = Utc::now();

        let expired = store
            .expire_stale_invitations(business.id, &email, now)
            .await?;
        if expired > 0 {
            tracing::info!(business_id = %business.id, expired, "Expired stale invitations");
        }

        if store.active_member_exists(business.id, &email).await? {
            return Err(AppError::Conflict(MEMBER_EXISTS.to_string()));
        }
        if store
            .find_live_invitation(business.id, &email, now)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(PENDING_INVITATION_EXISTS.to_string()));
        }

        let mut invitation = store
            .insert_invitation(
                NewInvitation::issue(business.id, &email, data.role, now, Some(actor.id))
                    .with_name(&data.first_name, &data.last_name),
            )
            .await?;

        tracing::info!(
            invitation_id = %invitation.id,
            business_id = %business.id,
            role = %invitation.role,
            "Invitation created"
        );

        let kind = match invitation.role {
            BusinessRole::Admin => EmailKind::AdminInvitation,
            BusinessRole::TeamMember => EmailKind::TeamInvitation,
        };
        let email_sent = self.deliver(&invitation, &business, kind).await.success;
        if email_sent {
            let sent_at = Utc::now();
            match store.mark_invitation_sent(invitation.id, sent_at).await {
                Ok(()) => invitation.sent_at = Some(sent_at),
                Err(e) => tracing::error!(
                    invitation_id = %invitation.id,
                    error = %e,
                    "Failed to stamp sent_at"
                ),
            }
        }

        Ok(SentInvitation {
            invitation,
            email_sent,
        })
    }

    /// Re-send the email of a live invitation; nothing changes unless it is delivered
    pub async fn resend(
        &self,
        actor: &IdentityUser,
        invitation_id: Uuid,
    ) -> AppResult<SentInvitation> {
        let store = &self.state.store;
        let invitation = store
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

        authorize_business_access(store.as_ref(), actor.id, invitation.business_id).await?;

        let now = Utc::now();
        match invitation.check_resend(now) {
            Ok(()) => {}
            Err(ResendRejection::NotPending) => {
                return Err(AppError::BadRequest(
                    "Invitation has already been used".to_string(),
                ))
            }
            Err(ResendRejection::Expired) => {
                store.mark_invitation_expired(invitation.id, now).await?;
                return Err(AppError::Expired(
                    "Expired invitations cannot be resent. Create a new invitation instead."
                        .to_string(),
                ));
            }
        }

        let business = self.business(invitation.business_id).await?;
        let result = self
            .deliver(&invitation, &business, EmailKind::InvitationResend)
            .await;
        if !result.success {
            return Err(AppError::EmailDelivery(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let invitation = store.record_invitation_resent(invitation.id, Utc::now()).await?;
        tracing::info!(
            invitation_id = %invitation.id,
            resent_count = invitation.resent_count,
            "Invitation resent"
        );

        Ok(SentInvitation {
            invitation,
            email_sent: true,
        })
    }

    /// Provision the identity account and membership for a pending invitation
    pub async fn accept(&self, input: &serde_json::Value) -> AppResult<AcceptedInvitation> {
        let store = &self.state.store;
        let identity = &self.state.identity;
        let data = validate_accept_invitation_data(input)?;
        let now = Utc::now();

        let invitation = store
            .get_invitation(data.invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(INVALID_INVITATION.to_string()))?;

        match invitation.check_acceptance(&data.email, now) {
            Ok(()) => {}
            Err(AcceptanceRejection::NotPending) => {
                return Err(AppError::NotFound(INVALID_INVITATION.to_string()))
            }
            Err(AcceptanceRejection::EmailMismatch) => {
                return Err(AppError::BadRequest(
                    "Email does not match the invitation".to_string(),
                ))
            }
            Err(AcceptanceRejection::Expired) => {
                store.mark_invitation_expired(invitation.id, now).await?;
                tracing::info!(invitation_id = %invitation.id, "Invitation expired on acceptance");
                return Err(AppError::Expired("Invitation has expired".to_string()));
            }
        }

        let mut saga = Saga::new("accept_invitation");

        let compensation_identity = identity.clone();
        let user = saga
            .run(
                "create_identity_user",
                identity.create_user(NewIdentityUser {
                    email: invitation.email.clone(),
                    password: data.password.clone(),
                    first_name: data.first_name.clone(),
                    last_name: data.last_name.clone(),
                    role: invitation.role,
                    business_id: invitation.business_id,
                }),
                move |user: &IdentityUser| {
                    let user_id = user.id;
                    async move { compensation_identity.delete_user(user_id).await }
                },
            )
            .await?;

        saga.step(
            "insert_business_user",
            store.insert_business_user(NewBusinessUser {
                business_id: invitation.business_id,
                user_id: user.id,
                role: invitation.role,
                first_name: data.first_name.clone(),
                last_name: data.last_name.clone(),
                email: invitation.email.clone(),
                created_by: Some(user.id),
            }),
        )
        .await?;
        saga.commit();

        if !store.mark_invitation_accepted(invitation.id, Utc::now()).await? {
            tracing::warn!(invitation_id = %invitation.id, "Invitation was settled concurrently");
        }
        tracing::info!(
            invitation_id = %invitation.id,
            user_id = %user.id,
            business_id = %invitation.business_id,
            "Invitation accepted"
        );

        let session = match identity
            .sign_in_with_password(&invitation.email, &data.password)
            .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Sign-in after acceptance failed");
                None
            }
        };
        let message = if session.is_some() {
            "Invitation accepted successfully"
        } else {
            "Account created. Please log in."
        };

        Ok(AcceptedInvitation {
            user_id: user.id,
            business_id: invitation.business_id,
            role: invitation.role,
            session,
            message: message.to_string(),
        })
    }

    /// All invitations of a business, newest first
    pub async fn list(
        &self,
        actor: &IdentityUser,
        business_id: Option<&str>,
    ) -> AppResult<Vec<InvitationView>> {
        let business_id = parse_business_id(business_id)?;
        let store = &self.state.store;
        authorize_business_access(store.as_ref(), actor.id, business_id).await?;

        let now = Utc::now();
        Ok(store
            .list_invitations(business_id)
            .await?
            .into_iter()
            .map(|invitation| InvitationView::at(invitation, now))
            .collect())
    }

    async fn business(&self, business_id: Uuid) -> AppResult<Business> {
        self.state
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Business not found".to_string()))
    }

    async fn deliver(
        &self,
        invitation: &Invitation,
        business: &Business,
        kind: EmailKind,
    ) -> SendResult {
        let business_type = match invitation.role {
            BusinessRole::Admin => self
                .state
                .store
                .business_type_name(business.business_type_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Failed to load business type name");
                    None
                }),
            BusinessRole::TeamMember => None,
        };

        let invitee_name = invitation.invitee_name();
        let link = self.state.config.app.acceptance_link(invitation.id);
        let rendered = render_invitation(&InvitationEmail {
            platform_name: &self.state.config.app.platform_name,
            business_name: &business.name,
            business_type: business_type.as_deref(),
            invitee_name: invitee_name.as_deref(),
            role: invitation.role,
            acceptance_link: &link,
            expires_at: invitation.expires_at,
        });

        self.state
            .dispatcher()
            .dispatch(kind, Some(invitation.id), &invitation.email, rendered)
            .await
    }
}

fn parse_business_id(raw: Option<&str>) -> Result<Uuid, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Err(ValidationError::new("business_id is required")),
        Some(raw) => Uuid::parse_str(raw)
            .map_err(|_| ValidationError::new("business_id must be a valid UUID")),
    }
}
