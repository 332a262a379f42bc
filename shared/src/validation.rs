//! Validation of onboarding and invitation payloads
//!
//! Every validator takes the raw JSON body and either returns a typed record
//! or a [`ValidationError`] listing every violation found, not just the first.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{BusinessRole, MAX_BOOKING_COMMISSION};
use crate::types::normalize_email;

/// Minimum password length accepted when an invitation is redeemed
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// All violations found in one payload
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", .violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.violations.iter().any(|v| v.contains(needle))
    }
}

/// Validated address sub-object of a business payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressData {
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

/// Validated create-business payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessData {
    pub name: String,
    pub business_type_id: Uuid,
    pub address: AddressData,
    pub license_number: Option<String>,
    pub pdv_number: Option<String>,
    pub tax_id: Option<String>,
    pub company_number: Option<String>,
    pub is_pdv_registered: bool,
    pub accepts_bookings: bool,
    pub default_booking_commission: Option<Decimal>,
    pub admin_email: String,
    pub admin_first_name: String,
    pub admin_last_name: String,
}

/// Validated send-invitation payload (new invitation branch)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvitationData {
    pub business_id: Uuid,
    pub email: String,
    pub role: BusinessRole,
    pub first_name: String,
    pub last_name: String,
}

/// Validated accept-invitation payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptInvitationData {
    pub invitation_id: Uuid,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Permissive email syntax check: one `@`, a dotted domain and a TLD of
/// at least two letters
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Validate a create-business payload
pub fn validate_business_data(input: &Value) -> Result<BusinessData, ValidationError> {
    let mut fields = Fields::new(input)?;

    let name = fields.required_str("name");
    let business_type_id = fields.required_uuid("business_type_id");
    let address = match fields.object("address") {
        Some(address) => validate_address(address, &mut fields.violations),
        None => {
            fields
                .violations
                .push("address is required and must be an object".to_string());
            None
        }
    };

    let license_number = fields.optional_str("license_number");
    let pdv_number = fields.optional_str("pdv_number");
    let tax_id = fields.optional_str("tax_id");
    let company_number = fields.optional_str("company_number");
    let is_pdv_registered = fields.flag("is_pdv_registered");
    let accepts_bookings = fields.flag("accepts_bookings");
    let default_booking_commission = fields.optional_decimal("default_booking_commission");

    if is_pdv_registered && pdv_number.is_none() {
        fields
            .violations
            .push("pdv_number is required when is_pdv_registered is true".to_string());
    }

    match default_booking_commission {
        Some(rate) if rate < Decimal::ZERO => fields
            .violations
            .push("default_booking_commission must be a non-negative number".to_string()),
        Some(rate) if rate > MAX_BOOKING_COMMISSION => fields.violations.push(format!(
            "default_booking_commission must not exceed {}",
            MAX_BOOKING_COMMISSION
        )),
        None if accepts_bookings && !fields.has("default_booking_commission") => fields
            .violations
            .push("default_booking_commission is required when accepts_bookings is true".to_string()),
        _ => {}
    }

    let admin_email = fields.email("admin_email");
    let admin_first_name = fields.required_str("admin_first_name");
    let admin_last_name = fields.required_str("admin_last_name");

    fields.finish()?;

    match (
        name,
        business_type_id,
        address,
        admin_email,
        admin_first_name,
        admin_last_name,
    ) {
        (
            Some(name),
            Some(business_type_id),
            Some(address),
            Some(admin_email),
            Some(admin_first_name),
            Some(admin_last_name),
        ) => Ok(BusinessData {
            name,
            business_type_id,
            address,
            license_number,
            pdv_number,
            tax_id,
            company_number,
            is_pdv_registered,
            accepts_bookings,
            default_booking_commission,
            admin_email,
            admin_first_name,
            admin_last_name,
        }),
        _ => Err(ValidationError::new("invalid business payload")),
    }
}

fn validate_address(address: &Map<String, Value>, violations: &mut Vec<String>) -> Option<AddressData> {
    let mut fields = Fields {
        object: address,
        prefix: "address.",
        violations: Vec::new(),
    };

    let address_line_1 = fields.required_str("address_line_1");
    let address_line_2 = fields.optional_str("address_line_2");
    let city = fields.required_str("city");
    let country = fields.required_str("country");
    let postal_code = fields.optional_str("postal_code");
    let latitude = fields.optional_decimal("latitude");
    let longitude = fields.optional_decimal("longitude");

    if let Some(lat) = latitude {
        if lat < Decimal::from(-90) || lat > Decimal::from(90) {
            fields
                .violations
                .push("address.latitude must be between -90 and 90".to_string());
        }
    }
    if let Some(lng) = longitude {
        if lng < Decimal::from(-180) || lng > Decimal::from(180) {
            fields
                .violations
                .push("address.longitude must be between -180 and 180".to_string());
        }
    }

    let valid = fields.violations.is_empty();
    violations.append(&mut fields.violations);
    if !valid {
        return None;
    }

    Some(AddressData {
        address_line_1: address_line_1?,
        address_line_2,
        city: city?,
        country: country?,
        postal_code,
        latitude,
        longitude,
    })
}

/// Validate a send-invitation payload for a new invitation
pub fn validate_invitation_data(input: &Value) -> Result<InvitationData, ValidationError> {
    let mut fields = Fields::new(input)?;

    let business_id = fields.required_uuid("business_id");
    let email = fields.email("email");
    let role = fields.role("role");
    let first_name = fields.required_str("first_name");
    let last_name = fields.required_str("last_name");

    fields.finish()?;

    match (business_id, email, role, first_name, last_name) {
        (Some(business_id), Some(email), Some(role), Some(first_name), Some(last_name)) => {
            Ok(InvitationData {
                business_id,
                email,
                role,
                first_name,
                last_name,
            })
        }
        _ => Err(ValidationError::new("invalid invitation payload")),
    }
}

/// Validate an accept-invitation payload
pub fn validate_accept_invitation_data(
    input: &Value,
) -> Result<AcceptInvitationData, ValidationError> {
    let mut fields = Fields::new(input)?;

    let invitation_id = fields.required_uuid("invitation_id");
    let email = fields.email("email");
    let password = fields.password("password");
    let first_name = fields.required_str("first_name");
    let last_name = fields.required_str("last_name");

    fields.finish()?;

    match (invitation_id, email, password, first_name, last_name) {
        (Some(invitation_id), Some(email), Some(password), Some(first_name), Some(last_name)) => {
            Ok(AcceptInvitationData {
                invitation_id,
                email,
                password,
                first_name,
                last_name,
            })
        }
        _ => Err(ValidationError::new("invalid accept-invitation payload")),
    }
}

/// Invitation targeted by a send-invitation payload, if it asks for a resend
pub fn resend_target(input: &Value) -> Result<Option<Uuid>, ValidationError> {
    match input.get("invitation_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => Uuid::parse_str(raw.trim())
            .map(Some)
            .map_err(|_| ValidationError::new("invitation_id must be a valid UUID")),
        Some(_) => Err(ValidationError::new("invitation_id must be a valid UUID")),
    }
}

/// Field reader that accumulates violations instead of stopping at the first
struct Fields<'a> {
    object: &'a Map<String, Value>,
    prefix: &'static str,
    violations: Vec<String>,
}

impl<'a> Fields<'a> {
    fn new(input: &'a Value) -> Result<Self, ValidationError> {
        let object = input
            .as_object()
            .ok_or_else(|| ValidationError::new("request body must be a JSON object"))?;
        Ok(Self {
            object,
            prefix: "",
            violations: Vec::new(),
        })
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }

    fn has(&self, key: &str) -> bool {
        !matches!(self.object.get(key), None | Some(Value::Null))
    }

    fn violation(&mut self, key: &str, message: &str) {
        self.violations
            .push(format!("{}{} {}", self.prefix, key, message));
    }

    fn object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.object.get(key).and_then(Value::as_object)
    }

    fn required_str(&mut self, key: &str) -> Option<String> {
        match self.object.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => {
                self.violation(key, "is required");
                None
            }
        }
    }

    fn optional_str(&mut self, key: &str) -> Option<String> {
        match self.object.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                self.violation(key, "must be a string");
                None
            }
        }
    }

    fn required_uuid(&mut self, key: &str) -> Option<Uuid> {
        let raw = self.required_str(key)?;
        match Uuid::parse_str(&raw) {
            Ok(id) => Some(id),
            Err(_) => {
                self.violation(key, "must be a valid UUID");
                None
            }
        }
    }

    fn flag(&mut self, key: &str) -> bool {
        match self.object.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.violation(key, "must be a boolean");
                false
            }
        }
    }

    fn optional_decimal(&mut self, key: &str) -> Option<Decimal> {
        let parsed = match self.object.get(key) {
            None | Some(Value::Null) => return None,
            Some(Value::Number(n)) => parse_decimal(&n.to_string()),
            Some(Value::String(s)) => parse_decimal(s.trim()),
            Some(_) => None,
        };
        if parsed.is_none() {
            self.violation(key, "must be a number");
        }
        parsed
    }

    fn email(&mut self, key: &str) -> Option<String> {
        let raw = self.required_str(key)?;
        if is_valid_email(&raw) {
            Some(normalize_email(&raw))
        } else {
            self.violation(key, "must be a valid email address");
            None
        }
    }

    fn role(&mut self, key: &str) -> Option<BusinessRole> {
        let raw = self.required_str(key)?;
        let role = BusinessRole::parse(&raw);
        if role.is_none() {
            self.violation(key, "must be one of: admin, team_member");
        }
        role
    }

    fn password(&mut self, key: &str) -> Option<String> {
        match self.object.get(key) {
            Some(Value::String(s)) if s.chars().count() >= MIN_PASSWORD_LENGTH => Some(s.clone()),
            Some(Value::String(s)) if !s.is_empty() => {
                self.violation(
                    key,
                    &format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
                );
                None
            }
            _ => {
                self.violation(key, "is required");
                None
            }
        }
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
