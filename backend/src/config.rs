//! Configuration management for the Business Onboarding service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with ONB_ prefix
//!
//! The resulting [`Config`] is built once at startup and handed to the
//! services explicitly; nothing below `main` reads the environment.

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Identity provider configuration
    pub auth: AuthConfig,

    /// Transactional email configuration
    pub email: EmailConfig,

    /// Public application settings used in outbound messages
    pub app: AppConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Base URL of the identity provider (GoTrue-compatible)
    pub url: String,

    /// Public API key sent with user-scoped requests
    pub anon_key: String,

    /// Privileged key for the admin user API
    pub service_role_key: String,

    /// When set, bearer tokens are verified locally as HS256 JWTs
    pub jwt_secret: Option<String>,

    /// Expected `aud` claim of locally verified tokens
    pub jwt_audience: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// Transactional email API base URL
    pub api_url: String,

    /// API key; sending is disabled when absent
    pub api_key: Option<String>,

    /// Default sender
    pub from_address: String,

    /// Default reply-to address
    pub reply_to: String,

    /// Seconds between outbox retry sweeps
    pub retry_interval_secs: u64,

    /// Delivery attempts before an outbox message is abandoned
    pub max_attempts: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Platform name shown in emails
    pub platform_name: String,

    /// Base URL of the business portal, used for acceptance links
    pub portal_url: String,
}

impl AppConfig {
    /// Link an invitee follows to accept an invitation
    pub fn acceptance_link(&self, invitation_id: uuid::Uuid) -> String {
        format!(
            "{}/accept-invitation?invitation_id={}",
            self.portal_url.trim_end_matches('/'),
            invitation_id
        )
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("ONB_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_audience", "authenticated")?
            .set_default("email.api_url", "https://api.resend.com")?
            .set_default("email.from_address", "Onboarding <noreply@example.com>")?
            .set_default("email.reply_to", "support@example.com")?
            .set_default("email.retry_interval_secs", 60)?
            .set_default("email.max_attempts", 5)?
            .set_default("app.platform_name", "Business Portal")?
            .set_default("app.portal_url", "http://localhost:5173")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (ONB_ prefix)
            .add_source(
                Environment::with_prefix("ONB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
