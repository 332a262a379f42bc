//! WebAssembly module for the Business Onboarding platform
//!
//! Lets the portal and guest forms pre-validate payloads with exactly the
//! rules the server applies:
//! - Business onboarding payloads
//! - Invitation payloads
//! - Invitation acceptance payloads
//! - Email syntax and invitation expiry

use serde_json::Value;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Collect the violations reported for a JSON payload.
///
/// Unparseable JSON is reported as a single violation.
fn violations_for<T>(
    payload_json: &str,
    validate: impl Fn(&Value) -> Result<T, ValidationError>,
) -> Vec<String> {
    match serde_json::from_str::<Value>(payload_json) {
        Ok(payload) => match validate(&payload) {
            Ok(_) => Vec::new(),
            Err(err) => err.violations,
        },
        Err(e) => vec![format!("Invalid JSON: {}", e)],
    }
}

fn to_js_array(violations: Vec<String>) -> js_sys::Array {
    violations.into_iter().map(JsValue::from).collect()
}

/// Validate a create-business form; returns the list of violations
#[wasm_bindgen]
pub fn validate_business_form(payload_json: &str) -> js_sys::Array {
    to_js_array(violations_for(payload_json, validate_business_data))
}

/// Validate an invitation form; returns the list of violations
#[wasm_bindgen]
pub fn validate_invitation_form(payload_json: &str) -> js_sys::Array {
    to_js_array(violations_for(payload_json, validate_invitation_data))
}

/// Validate an accept-invitation form; returns the list of violations
#[wasm_bindgen]
pub fn validate_accept_invitation_form(payload_json: &str) -> js_sys::Array {
    to_js_array(violations_for(payload_json, validate_accept_invitation_data))
}

/// Check email syntax with the server's pattern
#[wasm_bindgen]
pub fn check_email(email: &str) -> bool {
    is_valid_email(email)
}

/// Whether an invitation with the given RFC 3339 expiry has lapsed
#[wasm_bindgen]
pub fn is_invitation_expired(expires_at: &str) -> Result<bool, JsValue> {
    let expires_at = chrono::DateTime::parse_from_rfc3339(expires_at)
        .map_err(|e| JsValue::from_str(&format!("Invalid timestamp: {}", e)))?;
    Ok(expires_at.with_timezone(&chrono::Utc) <= chrono::Utc::now())
}

/// Days an invitation stays valid after it is sent
#[wasm_bindgen]
pub fn invitation_validity_days() -> i64 {
    INVITATION_VALIDITY_DAYS
}
