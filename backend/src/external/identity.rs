//! Identity provider client
//!
//! Talks to a GoTrue-compatible auth server for token verification, user
//! provisioning and password sign-in. When a JWT secret is configured,
//! bearer tokens are verified locally instead of with a round trip.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::models::BusinessRole;

/// Caller identity resolved from a bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Account to provision when an invitation is accepted
#[derive(Debug, Clone)]
pub struct NewIdentityUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: BusinessRole,
    pub business_id: Uuid,
}

/// Session minted by password sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token; fails with `Unauthenticated` when it is invalid
    async fn verify_token(&self, token: &str) -> AppResult<IdentityUser>;

    /// Create a user with a pre-confirmed email
    async fn create_user(&self, user: NewIdentityUser) -> AppResult<IdentityUser>;

    async fn delete_user(&self, id: Uuid) -> AppResult<()>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session>;
}

/// JWT claims issued by the auth server
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub aud: String,
    pub exp: i64,
}

/// GoTrue REST client
#[derive(Clone)]
pub struct GoTrueClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
    jwt_secret: Option<String>,
    jwt_audience: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
    role: Option<String>,
}

impl From<UserResponse> for IdentityUser {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

impl GoTrueClient {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
            jwt_audience: config.jwt_audience.clone(),
        }
    }

    /// Decode and validate an HS256 token with the shared secret
    fn decode_jwt(&self, token: &str, secret: &str) -> AppResult<IdentityUser> {
        use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.jwt_audience.as_str()]);

        let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthenticated(format!("Invalid token: {}", e)))?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthenticated("Invalid user ID in token".to_string()))?;

        Ok(IdentityUser {
            id,
            email: claims.email,
            role: claims.role,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    fn request_failed(e: reqwest::Error) -> AppError {
        AppError::IdentityProvider(format!("Identity provider request failed: {}", e))
    }
}

/// Turn a non-success response into an error, keeping the provider's message
async fn rejection(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body).unwrap_or_else(|| format!("{} - {}", status, body));

    if status.is_client_error() {
        AppError::IdentityRejected(message)
    } else {
        AppError::IdentityProvider(format!("Identity provider error: {}", message))
    }
}

fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn verify_token(&self, token: &str) -> AppResult<IdentityUser> {
        if let Some(secret) = &self.jwt_secret {
            return self.decode_jwt(token, secret);
        }

        let response = self
            .client
            .get(self.url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::request_failed)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Unauthenticated(
                    "Invalid or expired token".to_string(),
                ))
            }
            _ => return Err(rejection(response).await),
        }

        let user: UserResponse = response.json().await.map_err(|e| {
            AppError::IdentityProvider(format!("Failed to parse user response: {}", e))
        })?;
        Ok(user.into())
    }

    async fn create_user(&self, user: NewIdentityUser) -> AppResult<IdentityUser> {
        let body = serde_json::json!({
            "email": user.email,
            "password": user.password,
            "email_confirm": true,
            "user_metadata": {
                "first_name": user.first_name,
                "last_name": user.last_name,
                "role": user.role,
                "business_id": user.business_id,
            },
        });

        let response = self
            .client
            .post(self.url("/admin/users"))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let created: UserResponse = response.json().await.map_err(|e| {
            AppError::IdentityProvider(format!("Failed to parse user response: {}", e))
        })?;
        Ok(created.into())
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/admin/users/{}", id)))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session> {
        let response = self
            .client
            .post(self.url("/token?grant_type=password"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Failed to parse session: {}", e)))
    }
}
