//! Transactional email API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A fully rendered email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message, returning the provider's message id
    async fn send(&self, message: &EmailMessage) -> AppResult<Option<String>>;
}

/// Resend API client
#[derive(Clone)]
pub struct ResendClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

impl ResendClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, message: &EmailMessage) -> AppResult<Option<String>> {
        let body = serde_json::json!({
            "from": message.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
            "reply_to": message.reply_to,
        });

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::EmailDelivery(format!("Email API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmailDelivery(format!(
                "Email API error: {} - {}",
                status, body
            )));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmailDelivery(format!("Failed to parse email response: {}", e)))?;

        Ok(sent.id)
    }
}

/// Installed when no API key is configured; every send fails
#[derive(Debug, Clone, Default)]
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<Option<String>> {
        tracing::warn!(to = %message.to, "Email sending is not configured");
        Err(AppError::EmailDelivery(
            "email sending is not configured".to_string(),
        ))
    }
}
