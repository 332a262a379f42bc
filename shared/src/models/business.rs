//! Business and address models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound of the default booking commission, a percentage
pub const MAX_BOOKING_COMMISSION: Decimal = Decimal::ONE_HUNDRED;

/// Lifecycle status of an onboarded business
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "business_status", rename_all = "snake_case")
)]
pub enum BusinessStatus {
    #[default]
    Active,
    Suspended,
}

/// Postal address owned by exactly one business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Address {
    pub id: Uuid,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub is_verified: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting an address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAddress {
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub created_by: Option<Uuid>,
}

/// An onboarded commercial entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub business_type_id: Uuid,
    pub address_id: Option<Uuid>,
    pub license_number: Option<String>,
    pub pdv_number: Option<String>,
    pub tax_id: Option<String>,
    pub company_number: Option<String>,
    pub is_pdv_registered: bool,
    pub accepts_bookings: bool,
    pub default_booking_commission: Option<Decimal>,
    pub status: BusinessStatus,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for inserting a business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBusiness {
    pub name: String,
    pub business_type_id: Uuid,
    pub address_id: Option<Uuid>,
    pub license_number: Option<String>,
    pub pdv_number: Option<String>,
    pub tax_id: Option<String>,
    pub company_number: Option<String>,
    pub is_pdv_registered: bool,
    pub accepts_bookings: bool,
    pub default_booking_commission: Option<Decimal>,
    pub created_by: Option<Uuid>,
}

impl NewBusiness {
    /// Commission must be present and within 0..=100 whenever bookings are
    /// accepted, and a VAT number must accompany VAT registration.
    pub fn satisfies_invariants(&self) -> bool {
        let in_range = |rate: Decimal| (Decimal::ZERO..=MAX_BOOKING_COMMISSION).contains(&rate);
        let commission_ok = match (self.accepts_bookings, self.default_booking_commission) {
            (_, Some(rate)) => in_range(rate),
            (true, None) => false,
            (false, None) => true,
        };
        let vat_ok = !self.is_pdv_registered
            || self
                .pdv_number
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty());

        commission_ok && vat_ok
    }
}
