//! Shared harness for the integration tests
//!
//! Wires the services and router over the in-memory store, identity
//! provider and recording email sender.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use onboarding_backend::config::{
    AppConfig, AuthConfig, Config, DatabaseConfig, EmailConfig, ServerConfig,
};
use onboarding_backend::external::{IdentityUser, MemoryIdentityProvider, RecordingEmailSender};
use onboarding_backend::models::{BusinessRole, Invitation};
use onboarding_backend::services::{CreatedBusiness, OnboardingService};
use onboarding_backend::store::MemoryStore;
use onboarding_backend::{create_app, AppState};

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        auth: AuthConfig {
            url: "http://identity.invalid".to_string(),
            anon_key: "anon".to_string(),
            service_role_key: "service".to_string(),
            jwt_secret: None,
            jwt_audience: "authenticated".to_string(),
        },
        email: EmailConfig {
            api_url: "http://email.invalid".to_string(),
            api_key: None,
            from_address: "Portal <noreply@example.com>".to_string(),
            reply_to: "support@example.com".to_string(),
            retry_interval_secs: 60,
            max_attempts: 3,
        },
        app: AppConfig {
            platform_name: "Test Portal".to_string(),
            portal_url: "https://portal.example.com".to_string(),
        },
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub identity: Arc<MemoryIdentityProvider>,
    pub email: Arc<RecordingEmailSender>,
    pub state: AppState,
    pub business_type_id: Uuid,
    pub platform_admin: IdentityUser,
    pub platform_token: String,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(MemoryIdentityProvider::new());
        let email = Arc::new(RecordingEmailSender::new());

        let business_type_id = store.add_business_type("Spa");
        let (platform_admin, platform_token) = identity.register("root@platform.com");
        store.add_platform_admin(platform_admin.id, "root@platform.com");

        let state = AppState {
            store: store.clone(),
            identity: identity.clone(),
            email: email.clone(),
            config: Arc::new(test_config()),
        };

        Self {
            store,
            identity,
            email,
            state,
            business_type_id,
            platform_admin,
            platform_token,
        }
    }

    pub fn app(&self) -> Router {
        create_app(self.state.clone())
    }

    /// Scenario A payload for the seeded business type
    pub fn business_payload(&self) -> Value {
        json!({
            "name": "Test Spa",
            "business_type_id": self.business_type_id,
            "address": {
                "address_line_1": "1 Main St",
                "city": "Kotor",
                "country": "ME"
            },
            "is_pdv_registered": false,
            "accepts_bookings": false,
            "admin_email": "a@b.com",
            "admin_first_name": "Ana",
            "admin_last_name": "P"
        })
    }

    pub async fn onboard(&self) -> CreatedBusiness {
        OnboardingService::new(self.state.clone())
            .create_business(&self.platform_admin, &self.business_payload())
            .await
            .expect("business should be created")
    }

    /// Register a user who administers `business_id`
    pub fn business_admin(&self, business_id: Uuid, email: &str) -> (IdentityUser, String) {
        let (user, token) = self.identity.register(email);
        self.store
            .add_member(business_id, user.id, email, BusinessRole::Admin);
        (user, token)
    }

    pub fn outsider(&self) -> (IdentityUser, String) {
        self.identity.register("outsider@elsewhere.com")
    }

    pub fn invitation(&self, id: Uuid) -> Invitation {
        self.store
            .invitations()
            .into_iter()
            .find(|i| i.id == id)
            .expect("invitation should exist")
    }
}

pub fn team_invitation_payload(business_id: Uuid, email: &str, role: &str) -> Value {
    json!({
        "business_id": business_id,
        "email": email,
        "role": role,
        "first_name": "Nina",
        "last_name": "K"
    })
}

pub fn accept_payload(invitation_id: Uuid, email: &str) -> Value {
    json!({
        "invitation_id": invitation_id,
        "email": email,
        "password": "password123",
        "first_name": "Ana",
        "last_name": "P"
    })
}

/// Send a JSON request through the router and decode the JSON response
pub async fn call(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
