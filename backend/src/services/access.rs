//! Authorization policy
//!
//! | Operation                 | Allowed actors                                       |
//! |---------------------------|------------------------------------------------------|
//! | create business           | platform admin                                       |
//! | new invitation            | platform admin; business admin for team_member only  |
//! | resend / list invitations | platform admin, business admin of the business       |

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::BusinessRole;
use crate::store::OnboardingStore;

/// Standing of the caller relative to one business
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    PlatformAdmin,
    BusinessAdmin,
    Outsider,
}

impl Actor {
    /// Platform admins win over business membership
    pub async fn resolve(
        store: &dyn OnboardingStore,
        user_id: Uuid,
        business_id: Uuid,
    ) -> AppResult<Self> {
        if store.is_platform_admin(user_id).await? {
            return Ok(Actor::PlatformAdmin);
        }
        if store.is_business_admin(user_id, business_id).await? {
            return Ok(Actor::BusinessAdmin);
        }
        Ok(Actor::Outsider)
    }

    pub fn can_manage_invitations(self) -> bool {
        matches!(self, Actor::PlatformAdmin | Actor::BusinessAdmin)
    }

    pub fn can_grant(self, role: BusinessRole) -> bool {
        match self {
            Actor::PlatformAdmin => true,
            Actor::BusinessAdmin => role == BusinessRole::TeamMember,
            Actor::Outsider => false,
        }
    }
}

pub async fn require_platform_admin(store: &dyn OnboardingStore, user_id: Uuid) -> AppResult<()> {
    if store.is_platform_admin(user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Platform administrator access required".to_string(),
        ))
    }
}

/// Resend and list share the same rule
pub async fn authorize_business_access(
    store: &dyn OnboardingStore,
    user_id: Uuid,
    business_id: Uuid,
) -> AppResult<Actor> {
    let actor = Actor::resolve(store, user_id, business_id).await?;
    if !actor.can_manage_invitations() {
        return Err(AppError::Forbidden(
            "You do not have permission to manage invitations for this business".to_string(),
        ));
    }
    Ok(actor)
}

pub async fn authorize_new_invitation(
    store: &dyn OnboardingStore,
    user_id: Uuid,
    business_id: Uuid,
    role: BusinessRole,
) -> AppResult<Actor> {
    let actor = authorize_business_access(store, user_id, business_id).await?;
    if !actor.can_grant(role) {
        return Err(AppError::Forbidden(
            "Only platform administrators can invite business administrators".to_string(),
        ));
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_role_granting_policy() {
        assert!(Actor::PlatformAdmin.can_grant(BusinessRole::Admin));
        assert!(Actor::PlatformAdmin.can_grant(BusinessRole::TeamMember));
        assert!(!Actor::BusinessAdmin.can_grant(BusinessRole::Admin));
        assert!(Actor::BusinessAdmin.can_grant(BusinessRole::TeamMember));
        assert!(!Actor::Outsider.can_grant(BusinessRole::TeamMember));
        assert!(!Actor::Outsider.can_manage_invitations());
    }

    #[tokio::test]
    async fn test_business_admin_is_scoped_to_their_business() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.add_member(own, user_id, "admin@b.com", BusinessRole::Admin);

        assert_eq!(
            authorize_business_access(&store, user_id, own).await.unwrap(),
            Actor::BusinessAdmin
        );
        assert!(matches!(
            authorize_business_access(&store, user_id, other).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_team_members_cannot_manage_invitations() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let business_id = Uuid::new_v4();
        store.add_member(business_id, user_id, "member@b.com", BusinessRole::TeamMember);

        assert!(matches!(
            authorize_new_invitation(&store, user_id, business_id, BusinessRole::TeamMember).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_platform_admin_required() {
        let store = MemoryStore::new();
        let admin = Uuid::new_v4();
        store.add_platform_admin(admin, "root@platform.com");

        tokio_test::assert_ok!(require_platform_admin(&store, admin).await);
        tokio_test::assert_err!(require_platform_admin(&store, Uuid::new_v4()).await);
    }
}
