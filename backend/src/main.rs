//! Business Onboarding - Backend Server
//!
//! Invitation-based onboarding of businesses on top of PostgreSQL, a
//! GoTrue-compatible identity provider and a transactional email API.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use onboarding_backend::{
    create_app,
    external::{DisabledEmailSender, EmailSender, GoTrueClient, ResendClient},
    store::PgStore,
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "onboarding_server=debug,onboarding_backend=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Business Onboarding Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let email: Arc<dyn EmailSender> = match &config.email.api_key {
        Some(api_key) => Arc::new(ResendClient::new(
            api_key.clone(),
            config.email.api_url.clone(),
        )),
        None => {
            tracing::warn!("No email API key configured; invitation emails will not be sent");
            Arc::new(DisabledEmailSender)
        }
    };

    // Create application state
    let state = AppState {
        store: Arc::new(PgStore::new(db_pool)),
        identity: Arc::new(GoTrueClient::new(&config.auth)),
        email,
        config: Arc::new(config.clone()),
    };

    spawn_outbox_retry(state.clone());

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically redeliver failed invitation emails
fn spawn_outbox_retry(state: AppState) {
    let period = Duration::from_secs(state.config.email.retry_interval_secs.max(1));
    let max_attempts = state.config.email.max_attempts;
    let dispatcher = state.dispatcher();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = dispatcher.retry_failed_emails(max_attempts).await {
                tracing::error!(error = %e, "Outbox retry sweep failed");
            }
        }
    });
}
