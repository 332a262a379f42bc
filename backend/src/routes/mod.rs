//! Route definitions for the Business Onboarding service

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Platform admin only
        .route(
            "/create-business",
            post(handlers::create_business).layer(cors(&[Method::POST])),
        )
        // Platform admin or business admin
        .route(
            "/send-invitation",
            post(handlers::send_invitation).layer(cors(&[Method::POST])),
        )
        // Public: the invitation itself is the credential
        .route(
            "/accept-invitation",
            post(handlers::accept_invitation).layer(cors(&[Method::POST])),
        )
        // Platform admin or business admin
        .route(
            "/list-business-invitations",
            get(handlers::list_business_invitations).layer(cors(&[Method::GET])),
        )
}

/// CORS for one route: any origin, the route's methods plus preflight
fn cors(methods: &[Method]) -> CorsLayer {
    let mut allowed = methods.to_vec();
    allowed.push(Method::OPTIONS);

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(allowed)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
