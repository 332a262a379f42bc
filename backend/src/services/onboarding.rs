//! Business onboarding workflow
//!
//! Creates the address and business as one compensated unit, then issues
//! the first administrator invitation. A failure after the business exists
//! leaves it in place: an operator can always send another invitation.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::access::require_platform_admin;
use super::saga::Saga;
use super::templates::{admin_invitation, InvitationEmail};
use crate::error::AppResult;
use crate::external::IdentityUser;
use crate::models::{Address, BusinessRole, EmailKind, NewAddress, NewBusiness, NewInvitation};
use crate::AppState;
use shared::validate_business_data;

/// Result of a successful onboarding
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreatedBusiness {
    pub business_id: Uuid,
    pub business_name: String,
    pub invitation_id: Uuid,
    pub invitation_sent: bool,
}

pub struct OnboardingService {
    state: AppState,
}

impl OnboardingService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn create_business(
        &self,
        actor: &IdentityUser,
        input: &serde_json::Value,
    ) -> AppResult<CreatedBusiness> {
        let store = &self.state.store;
        require_platform_admin(store.as_ref(), actor.id).await?;
        let data = validate_business_data(input)?;
        let now = Utc::now();

        let mut saga = Saga::new("create_business");

        let compensation_store = store.clone();
        let address = saga
            .run(
                "insert_address",
                store.insert_address(NewAddress {
                    address_line_1: data.address.address_line_1,
                    address_line_2: data.address.address_line_2,
                    city: data.address.city,
                    country: data.address.country,
                    postal_code: data.address.postal_code,
                    latitude: data.address.latitude,
                    longitude: data.address.longitude,
                    created_by: Some(actor.id),
                }),
                move |address: &Address| {
                    let address_id = address.id;
                    async move { compensation_store.delete_address(address_id).await }
                },
            )
            .await?;

        let business = saga
            .step(
                "insert_business",
                store.insert_business(NewBusiness {
                    name: data.name,
                    business_type_id: data.business_type_id,
                    address_id: Some(address.id),
                    license_number: data.license_number,
                    pdv_number: data.pdv_number,
                    tax_id: data.tax_id,
                    company_number: data.company_number,
                    is_pdv_registered: data.is_pdv_registered,
                    accepts_bookings: data.accepts_bookings,
                    default_booking_commission: data.default_booking_commission,
                    created_by: Some(actor.id),
                }),
            )
            .await?;
        saga.commit();

        tracing::info!(business_id = %business.id, name = %business.name, "Business created");

        let business_type = match store.business_type_name(business.business_type_id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load business type name");
                None
            }
        };

        let invitation = store
            .insert_invitation(
                NewInvitation::issue(
                    business.id,
                    &data.admin_email,
                    BusinessRole::Admin,
                    now,
                    Some(actor.id),
                )
                .with_name(&data.admin_first_name, &data.admin_last_name),
            )
            .await?;

        let invitee_name = invitation.invitee_name();
        let link = self.state.config.app.acceptance_link(invitation.id);
        let rendered = admin_invitation(&InvitationEmail {
            platform_name: &self.state.config.app.platform_name,
            business_name: &business.name,
            business_type: business_type.as_deref(),
            invitee_name: invitee_name.as_deref(),
            role: invitation.role,
            acceptance_link: &link,
            expires_at: invitation.expires_at,
        });

        let sent = self
            .state
            .dispatcher()
            .dispatch(
                EmailKind::AdminInvitation,
                Some(invitation.id),
                &invitation.email,
                rendered,
            )
            .await;

        if sent.success {
            if let Err(e) = store.mark_invitation_sent(invitation.id, Utc::now()).await {
                tracing::error!(invitation_id = %invitation.id, error = %e, "Failed to stamp sent_at");
            }
        }

        Ok(CreatedBusiness {
            business_id: business.id,
            business_name: business.name,
            invitation_id: invitation.id,
            invitation_sent: sent.success,
        })
    }
}
