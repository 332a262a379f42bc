//! Invitation HTTP handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::ApiResponse;

use super::parse_json;
use crate::middleware::CurrentUser;
use crate::services::{InvitationService, SendOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListInvitationsQuery {
    pub business_id: Option<String>,
}

/// Issue a new invitation, or resend one when `invitation_id` is given
pub async fn send_invitation(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    body: Bytes,
) -> impl IntoResponse {
    let input = match parse_json(&body) {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    let service = InvitationService::new(state);

    match service.send(&actor, &input).await {
        Ok(SendOutcome::Created(sent)) => {
            (StatusCode::CREATED, Json(ApiResponse::ok(sent))).into_response()
        }
        Ok(SendOutcome::Resent(sent)) => (StatusCode::OK, Json(ApiResponse::ok(sent))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Accept an invitation; the invitation id, email and password are the credential
pub async fn accept_invitation(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let input = match parse_json(&body) {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    let service = InvitationService::new(state);

    match service.accept(&input).await {
        Ok(accepted) => (StatusCode::CREATED, Json(ApiResponse::ok(accepted))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List invitations of a business, newest first
pub async fn list_business_invitations(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<ListInvitationsQuery>,
) -> impl IntoResponse {
    let service = InvitationService::new(state);

    match service.list(&actor, query.business_id.as_deref()).await {
        Ok(invitations) => (StatusCode::OK, Json(ApiResponse::ok(invitations))).into_response(),
        Err(e) => e.into_response(),
    }
}
