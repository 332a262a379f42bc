//! Invitation lifecycle tests
//!
//! Covers the invitation state machine:
//! - At most one live pending invitation per (business, email)
//! - Business admins may only grant team_member
//! - Acceptance provisions identity and membership, with compensation
//! - Lazy expiry on acceptance and resend
//! - Listing is authorized and newest first

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use onboarding_backend::error::AppError;
use onboarding_backend::models::{BusinessRole, EmailKind, InvitationStatus};
use onboarding_backend::services::{InvitationService, SendOutcome};
use onboarding_backend::store::StoreOp;
use serde_json::json;
use uuid::Uuid;

use common::{accept_payload, call, team_invitation_payload, Harness};

fn service(harness: &Harness) -> InvitationService {
    InvitationService::new(harness.state.clone())
}

// ============================================================================
// New Invitations
// ============================================================================

#[tokio::test]
async fn test_business_admin_invites_team_member() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (admin, _) = harness.business_admin(created.business_id, "owner@b.com");

    let outcome = service(&harness)
        .send(&admin, &team_invitation_payload(created.business_id, "New@B.com", "team_member"))
        .await
        .unwrap();

    let sent = match outcome {
        SendOutcome::Created(sent) => sent,
        other => panic!("expected a new invitation, got {:?}", other),
    };
    assert!(sent.email_sent);
    assert_eq!(sent.invitation.email, "new@b.com");
    assert_eq!(sent.invitation.role, BusinessRole::TeamMember);
    assert_eq!(sent.invitation.created_by, Some(admin.id));
    assert!(sent.invitation.sent_at.is_some());

    let outbox = harness.store.outbox();
    assert_eq!(outbox.last().unwrap().kind, EmailKind::TeamInvitation);
}

#[tokio::test]
async fn test_business_admin_cannot_grant_admin() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (admin, _) = harness.business_admin(created.business_id, "owner@b.com");

    let err = service(&harness)
        .create(&admin, &team_invitation_payload(created.business_id, "new@b.com", "admin"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(harness.store.invitations().len(), 1);
}

#[tokio::test]
async fn test_platform_admin_can_grant_admin() {
    let harness = Harness::new();
    let created = harness.onboard().await;

    let sent = service(&harness)
        .create(
            &harness.platform_admin,
            &team_invitation_payload(created.business_id, "second@b.com", "admin"),
        )
        .await
        .unwrap();

    assert_eq!(sent.invitation.role, BusinessRole::Admin);
}

#[tokio::test]
async fn test_second_pending_invitation_conflicts() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let payload = team_invitation_payload(created.business_id, "new@b.com", "team_member");

    service(&harness).create(&harness.platform_admin, &payload).await.unwrap();
    let err = service(&harness)
        .create(&harness.platform_admin, &payload)
        .await
        .unwrap_err();

    match err {
        AppError::Conflict(msg) => assert!(msg.contains("pending invitation already exists")),
        other => panic!("unexpected error: {:?}", other),
    }
    let pending = harness
        .store
        .invitations()
        .into_iter()
        .filter(|i| i.email == "new@b.com" && i.status == InvitationStatus::Pending)
        .count();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_stale_pending_invitation_is_expired_and_replaced() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let payload = team_invitation_payload(created.business_id, "new@b.com", "team_member");

    let first = service(&harness)
        .create(&harness.platform_admin, &payload)
        .await
        .unwrap();
    harness
        .store
        .backdate_invitation(first.invitation.id, Utc::now() - Duration::days(8));

    let second = service(&harness)
        .create(&harness.platform_admin, &payload)
        .await
        .unwrap();

    assert_ne!(first.invitation.id, second.invitation.id);
    assert_eq!(
        harness.invitation(first.invitation.id).status,
        InvitationStatus::Expired
    );
}

#[tokio::test]
async fn test_existing_member_cannot_be_invited() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.business_admin(created.business_id, "owner@b.com");

    let err = service(&harness)
        .create(
            &harness.platform_admin,
            &team_invitation_payload(created.business_id, "OWNER@b.com", "team_member"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_invitation_for_unknown_business_is_not_found() {
    let harness = Harness::new();

    let err = service(&harness)
        .create(
            &harness.platform_admin,
            &team_invitation_payload(Uuid::new_v4(), "new@b.com", "team_member"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Resend
// ============================================================================

#[tokio::test]
async fn test_resend_increments_counter() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (admin, _) = harness.business_admin(created.business_id, "owner@b.com");

    let outcome = service(&harness)
        .send(&admin, &json!({ "invitation_id": created.invitation_id }))
        .await
        .unwrap();

    let sent = match outcome {
        SendOutcome::Resent(sent) => sent,
        other => panic!("expected a resend, got {:?}", other),
    };
    assert_eq!(sent.invitation.resent_count, 1);
    assert!(sent.invitation.last_resent_at.is_some());
    assert_eq!(harness.email.sent().len(), 2);
    assert_eq!(harness.store.outbox().last().unwrap().kind, EmailKind::InvitationResend);
}

#[tokio::test]
async fn test_resend_of_expired_invitation_fails_without_mutation() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness
        .store
        .backdate_invitation(created.invitation_id, Utc::now() - Duration::days(9));

    let err = service(&harness)
        .resend(&harness.platform_admin, created.invitation_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Expired(_)));
    let invitation = harness.invitation(created.invitation_id);
    assert_eq!(invitation.resent_count, 0);
    assert!(invitation.last_resent_at.is_none());
    assert_eq!(invitation.status, InvitationStatus::Expired);
    assert_eq!(harness.email.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_resend_surfaces_error_without_mutation() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.email.set_failing(true);

    let err = service(&harness)
        .resend(&harness.platform_admin, created.invitation_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmailDelivery(_)));
    assert_eq!(harness.invitation(created.invitation_id).resent_count, 0);
}

#[tokio::test]
async fn test_resend_of_accepted_invitation_is_rejected() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap();

    let err = service(&harness)
        .resend(&harness.platform_admin, created.invitation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_outsider_cannot_resend() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (outsider, _) = harness.outsider();

    let err = service(&harness)
        .resend(&outsider, created.invitation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

// ============================================================================
// Acceptance
// ============================================================================

#[tokio::test]
async fn test_accept_provisions_user_and_membership() {
    let harness = Harness::new();
    let created = harness.onboard().await;

    let accepted = service(&harness)
        .accept(&accept_payload(created.invitation_id, "A@B.com"))
        .await
        .unwrap();

    assert_eq!(accepted.business_id, created.business_id);
    assert_eq!(accepted.role, BusinessRole::Admin);
    assert!(accepted.session.is_some());

    let members = harness.store.business_users();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, accepted.user_id);
    assert_eq!(members[0].role, BusinessRole::Admin);
    assert_eq!(members[0].email, "a@b.com");

    let invitation = harness.invitation(created.invitation_id);
    assert_eq!(invitation.status, InvitationStatus::Accepted);
    assert!(invitation.accepted_at.is_some());
    assert!(harness.identity.find_by_email("a@b.com").is_some());
}

#[tokio::test]
async fn test_accept_replay_is_rejected() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let payload = accept_payload(created.invitation_id, "a@b.com");

    service(&harness).accept(&payload).await.unwrap();
    let err = service(&harness).accept(&payload).await.unwrap_err();

    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "Invalid or expired invitation"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(harness.store.business_users().len(), 1);
}

#[tokio::test]
async fn test_accept_with_other_email_changes_nothing() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let before = harness.invitation(created.invitation_id);

    let err = service(&harness)
        .accept(&accept_payload(created.invitation_id, "someone@else.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(harness.invitation(created.invitation_id), before);
    assert!(harness.store.business_users().is_empty());
    assert!(harness.identity.find_by_email("someone@else.com").is_none());
}

#[tokio::test]
async fn test_accept_expired_invitation_marks_it_expired() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness
        .store
        .backdate_invitation(created.invitation_id, Utc::now() - Duration::days(9));

    let err = service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Expired(_)));
    assert_eq!(
        harness.invitation(created.invitation_id).status,
        InvitationStatus::Expired
    );
    assert!(harness.identity.find_by_email("a@b.com").is_none());
}

#[tokio::test]
async fn test_membership_failure_deletes_identity_user() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.store.fail_next(StoreOp::InsertBusinessUser);

    let result = service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await;

    assert!(result.is_err());
    assert!(harness.identity.find_by_email("a@b.com").is_none());
    assert_eq!(harness.identity.deleted_users().len(), 1);
    assert_eq!(
        harness.invitation(created.invitation_id).status,
        InvitationStatus::Pending
    );

    // The invitation stays usable once the store recovers
    service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_compensation_keeps_original_error() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.store.fail_next(StoreOp::InsertBusinessUser);
    harness.identity.fail_delete_user(true);

    let err = service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test]
async fn test_identity_failure_leaves_no_membership() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.identity.fail_create_user(true);

    let err = service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::IdentityProvider(_)));
    assert!(harness.store.business_users().is_empty());
    assert!(harness.identity.deleted_users().is_empty());
}

#[tokio::test]
async fn test_sign_in_failure_still_accepts() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness.identity.fail_sign_in(true);

    let accepted = service(&harness)
        .accept(&accept_payload(created.invitation_id, "a@b.com"))
        .await
        .unwrap();

    assert!(accepted.session.is_none());
    assert_eq!(accepted.message, "Account created. Please log in.");
    assert_eq!(
        harness.invitation(created.invitation_id).status,
        InvitationStatus::Accepted
    );
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_is_newest_first_and_flags_expiry() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let later = service(&harness)
        .create(
            &harness.platform_admin,
            &team_invitation_payload(created.business_id, "new@b.com", "team_member"),
        )
        .await
        .unwrap();
    harness
        .store
        .backdate_invitation(created.invitation_id, Utc::now() - Duration::days(8));

    let business_id = created.business_id.to_string();
    let listed = service(&harness)
        .list(&harness.platform_admin, Some(&business_id))
        .await
        .unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].invitation.id, later.invitation.id);
    assert!(!listed[0].is_expired);
    assert_eq!(listed[1].invitation.id, created.invitation_id);
    assert!(listed[1].is_expired);
    // Listing never writes the lazy transition
    assert_eq!(listed[1].invitation.status, InvitationStatus::Pending);
}

#[tokio::test]
async fn test_list_requires_business_access() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (outsider, _) = harness.outsider();

    let err = service(&harness)
        .list(&outsider, Some(&created.business_id.to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service(&harness)
        .list(&harness.platform_admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

// ============================================================================
// HTTP Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_b_accepting_stale_invitation() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    harness
        .store
        .backdate_invitation(created.invitation_id, Utc::now() - Duration::days(9));

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/accept-invitation",
        None,
        Some(accept_payload(created.invitation_id, "a@b.com")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVITATION_EXPIRED"));
    assert!(body["error"].as_str().unwrap().contains("expired"));
    assert_eq!(
        harness.invitation(created.invitation_id).status,
        InvitationStatus::Expired
    );
}

#[tokio::test]
async fn test_scenario_c_business_admin_inviting_admin() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let (_, token) = harness.business_admin(created.business_id, "owner@b.com");

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/send-invitation",
        Some(&token),
        Some(team_invitation_payload(created.business_id, "new@b.com", "admin")),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_scenario_d_duplicate_pending_invitation() {
    let harness = Harness::new();
    let created = harness.onboard().await;
    let payload = team_invitation_payload(created.business_id, "new@b.com", "team_member");

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/send-invitation",
        Some(&harness.platform_token),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email_sent"], json!(true));

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/send-invitation",
        Some(&harness.platform_token),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("pending invitation already exists"));
}

#[tokio::test]
async fn test_resend_over_http_is_ok() {
    let harness = Harness::new();
    let created = harness.onboard().await;

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/send-invitation",
        Some(&harness.platform_token),
        Some(json!({ "invitation_id": created.invitation_id })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resent_count"], json!(1));
}

#[tokio::test]
async fn test_accept_over_http_returns_session() {
    let harness = Harness::new();
    let created = harness.onboard().await;

    let (status, body) = call(
        harness.app(),
        Method::POST,
        "/api/v1/accept-invitation",
        None,
        Some(accept_payload(created.invitation_id, "a@b.com")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));
    assert!(body["data"]["session"]["access_token"].is_string());

    // Replay
    let (status, _) = call(
        harness.app(),
        Method::POST,
        "/api/v1/accept-invitation",
        None,
        Some(accept_payload(created.invitation_id, "a@b.com")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_over_http() {
    let harness = Harness::new();
    let created = harness.onboard().await;

    let (status, body) = call(
        harness.app(),
        Method::GET,
        &format!("/api/v1/list-business-invitations?business_id={}", created.business_id),
        Some(&harness.platform_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["is_expired"], json!(false));

    let (status, body) = call(
        harness.app(),
        Method::GET,
        "/api/v1/list-business-invitations",
        Some(&harness.platform_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("business_id"));
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let harness = Harness::new();
    let request = axum::http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/send-invitation")
        .header("origin", "https://portal.example.com")
        .header("access-control-request-method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(harness.app(), request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
    let methods = response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("POST"));
    assert!(!methods.contains("GET"));
}

#[tokio::test]
async fn test_health_reports_store() {
    let harness = Harness::new();
    let (status, body) = call(harness.app(), Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], json!("connected"));
}
