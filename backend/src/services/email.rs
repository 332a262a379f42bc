//! Outbound email dispatch
//!
//! Every email is recorded in the outbox before delivery is attempted, so a
//! failed send can be picked up again by [`EmailDispatcher::retry_failed_emails`].
//! Dispatch never fails the calling workflow; the outcome is reported as a
//! [`SendResult`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::templates::RenderedEmail;
use crate::config::EmailConfig;
use crate::error::AppResult;
use crate::external::{EmailMessage, EmailSender};
use crate::models::{EmailKind, NewOutboxMessage, OutboxMessage};
use crate::store::OnboardingStore;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

/// Counts from one retry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub delivered: usize,
}

const RETRY_BATCH_SIZE: i64 = 50;

#[derive(Clone)]
pub struct EmailDispatcher {
    store: Arc<dyn OnboardingStore>,
    sender: Arc<dyn EmailSender>,
    from_address: String,
    reply_to: String,
}

impl EmailDispatcher {
    pub fn new(
        store: Arc<dyn OnboardingStore>,
        sender: Arc<dyn EmailSender>,
        config: &EmailConfig,
    ) -> Self {
        Self {
            store,
            sender,
            from_address: config.from_address.clone(),
            reply_to: config.reply_to.clone(),
        }
    }

    /// Record the email in the outbox and attempt delivery once
    pub async fn dispatch(
        &self,
        kind: EmailKind,
        invitation_id: Option<Uuid>,
        to: &str,
        rendered: RenderedEmail,
    ) -> SendResult {
        let message = EmailMessage {
            from: self.from_address.clone(),
            to: to.to_string(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            reply_to: self.reply_to.clone(),
        };

        let outbox_id = match self
            .store
            .enqueue_email(NewOutboxMessage {
                kind,
                invitation_id,
                recipient: message.to.clone(),
                subject: message.subject.clone(),
                html_body: message.html.clone(),
                text_body: message.text.clone(),
                from_address: message.from.clone(),
                reply_to: message.reply_to.clone(),
            })
            .await
        {
            Ok(record) => Some(record.id),
            Err(e) => {
                tracing::error!(error = %e, ?kind, "Failed to record email in outbox");
                None
            }
        };

        tracing::info!(?kind, to = %message.to, subject = %message.subject, "Sending email");
        let result = match self.sender.send(&message).await {
            Ok(message_id) => {
                tracing::info!(?kind, to = %message.to, ?message_id, "Email sent");
                SendResult::sent(message_id)
            }
            Err(e) => {
                tracing::warn!(?kind, to = %message.to, error = %e, "Email delivery failed");
                SendResult::failed(e.to_string())
            }
        };

        if let Some(id) = outbox_id {
            self.record_outcome(id, &result).await;
        }
        result
    }

    async fn record_outcome(&self, outbox_id: Uuid, result: &SendResult) {
        let recorded = match &result.error {
            None => {
                self.store
                    .mark_email_sent(outbox_id, result.message_id.clone(), Utc::now())
                    .await
            }
            Some(error) => self.store.mark_email_failed(outbox_id, error).await,
        };
        if let Err(e) = recorded {
            tracing::error!(%outbox_id, error = %e, "Failed to update outbox record");
        }
    }

    /// Redeliver failed invitation emails that are still under the attempt limit
    pub async fn retry_failed_emails(&self, max_attempts: i32) -> AppResult<RetrySummary> {
        let pending = self
            .store
            .retryable_emails(max_attempts, RETRY_BATCH_SIZE)
            .await?;

        let mut summary = RetrySummary::default();
        for record in pending {
            summary.attempted += 1;
            if self.redeliver(&record).await {
                summary.delivered += 1;
            }
        }

        if summary.attempted > 0 {
            tracing::info!(
                attempted = summary.attempted,
                delivered = summary.delivered,
                "Outbox retry sweep finished"
            );
        }
        Ok(summary)
    }

    async fn redeliver(&self, record: &OutboxMessage) -> bool {
        let message = EmailMessage {
            from: record.from_address.clone(),
            to: record.recipient.clone(),
            subject: record.subject.clone(),
            html: record.html_body.clone(),
            text: record.text_body.clone(),
            reply_to: record.reply_to.clone(),
        };

        let result = match self.sender.send(&message).await {
            Ok(message_id) => SendResult::sent(message_id),
            Err(e) => SendResult::failed(e.to_string()),
        };
        self.record_outcome(record.id, &result).await;

        if result.success {
            if let Some(invitation_id) = record.invitation_id {
                if let Err(e) = self.store.mark_invitation_sent(invitation_id, Utc::now()).await {
                    tracing::error!(%invitation_id, error = %e, "Failed to stamp invitation sent_at");
                }
            }
        }
        result.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::RecordingEmailSender;
    use crate::models::OutboxStatus;
    use crate::store::{MemoryStore, StoreOp};

    fn email_config() -> EmailConfig {
        EmailConfig {
            api_url: "http://unused".to_string(),
            api_key: None,
            from_address: "Portal <noreply@example.com>".to_string(),
            reply_to: "support@example.com".to_string(),
            retry_interval_secs: 60,
            max_attempts: 3,
        }
    }

    fn rendered() -> RenderedEmail {
        RenderedEmail {
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<RecordingEmailSender>, EmailDispatcher) {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingEmailSender::new());
        let dispatcher = EmailDispatcher::new(store.clone(), sender.clone(), &email_config());
        (store, sender, dispatcher)
    }

    #[tokio::test]
    async fn test_successful_dispatch_is_recorded_as_sent() {
        let (store, sender, dispatcher) = setup();

        let result = dispatcher
            .dispatch(EmailKind::TeamInvitation, None, "a@b.com", rendered())
            .await;

        assert!(result.success);
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(sender.sent()[0].reply_to, "support@example.com");
        let outbox = store.outbox();
        assert_eq!(outbox[0].status, OutboxStatus::Sent);
        assert_eq!(outbox[0].provider_message_id, result.message_id);
    }

    #[tokio::test]
    async fn test_failed_dispatch_reports_error_without_failing() {
        let (store, sender, dispatcher) = setup();
        sender.set_failing(true);

        let result = dispatcher
            .dispatch(EmailKind::TeamInvitation, None, "a@b.com", rendered())
            .await;

        assert!(!result.success);
        assert!(result.error.is_some());
        let outbox = store.outbox();
        assert_eq!(outbox[0].status, OutboxStatus::Failed);
        assert_eq!(outbox[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_outbox_failure_still_attempts_delivery() {
        let (store, sender, dispatcher) = setup();
        store.fail_next(StoreOp::EnqueueEmail);

        let result = dispatcher
            .dispatch(EmailKind::AdminInvitation, None, "a@b.com", rendered())
            .await;

        assert!(result.success);
        assert_eq!(sender.sent().len(), 1);
        assert!(store.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_retry_respects_kind_and_attempt_limit() {
        let (store, sender, dispatcher) = setup();
        sender.set_failing(true);
        dispatcher
            .dispatch(EmailKind::TeamInvitation, None, "a@b.com", rendered())
            .await;
        dispatcher
            .dispatch(EmailKind::InvitationResend, None, "c@d.com", rendered())
            .await;

        // Still failing: one more attempt on the retryable message only
        let summary = dispatcher.retry_failed_emails(3).await.unwrap();
        assert_eq!(summary, RetrySummary { attempted: 1, delivered: 0 });

        sender.set_failing(false);
        let summary = dispatcher.retry_failed_emails(3).await.unwrap();
        assert_eq!(summary, RetrySummary { attempted: 1, delivered: 1 });
        assert_eq!(sender.sent()[0].to, "a@b.com");

        // Nothing left to retry
        let summary = dispatcher.retry_failed_emails(3).await.unwrap();
        assert_eq!(summary.attempted, 0);
    }

    #[tokio::test]
    async fn test_retry_stops_at_max_attempts() {
        let (_store, sender, dispatcher) = setup();
        sender.set_failing(true);
        dispatcher
            .dispatch(EmailKind::AdminInvitation, None, "a@b.com", rendered())
            .await;

        assert_eq!(dispatcher.retry_failed_emails(2).await.unwrap().attempted, 1);
        assert_eq!(dispatcher.retry_failed_emails(2).await.unwrap().attempted, 0);
    }
}
