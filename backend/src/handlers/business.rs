//! Business onboarding HTTP handlers

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use shared::ApiResponse;

use super::parse_json;
use crate::middleware::CurrentUser;
use crate::services::OnboardingService;
use crate::AppState;

/// Create a business, its address and the first admin invitation
pub async fn create_business(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    body: Bytes,
) -> impl IntoResponse {
    let input = match parse_json(&body) {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    let service = OnboardingService::new(state);

    match service.create_business(&actor, &input).await {
        Ok(created) => (StatusCode::CREATED, Json(ApiResponse::ok(created))).into_response(),
        Err(e) => e.into_response(),
    }
}
