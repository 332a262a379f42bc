//! Business Onboarding service
//!
//! Creates businesses, issues and resends invitations, and turns accepted
//! invitations into identity-provider accounts with business membership.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use external::{EmailSender, IdentityProvider};
use services::EmailDispatcher;
use store::OnboardingStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OnboardingStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub email: Arc<dyn EmailSender>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn dispatcher(&self) -> EmailDispatcher {
        EmailDispatcher::new(self.store.clone(), self.email.clone(), &self.config.email)
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Business Onboarding API v1.0"
}
