//! Business membership and platform administration models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role held within a single business
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "business_role", rename_all = "snake_case")
)]
pub enum BusinessRole {
    Admin,
    TeamMember,
}

impl BusinessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BusinessRole::Admin => "admin",
            BusinessRole::TeamMember => "team_member",
        }
    }

    /// Human-readable label used in emails
    pub fn label(self) -> &'static str {
        match self {
            BusinessRole::Admin => "Administrator",
            BusinessRole::TeamMember => "Team Member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(BusinessRole::Admin),
            "team_member" => Some(BusinessRole::TeamMember),
            _ => None,
        }
    }
}

impl std::fmt::Display for BusinessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership linking an identity-provider user to a business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BusinessUser {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub role: BusinessRole,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BusinessUser {
    /// Active and not soft-deleted
    pub fn is_current(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Input for inserting a business membership
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBusinessUser {
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub role: BusinessRole,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_by: Option<Uuid>,
}

/// Identity-provider user with platform-wide authority
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PlatformAdmin {
    pub user_id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
