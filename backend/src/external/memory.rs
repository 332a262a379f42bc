//! In-process identity provider and email sender used by the test suites

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::email::{EmailMessage, EmailSender};
use super::identity::{IdentityProvider, IdentityUser, NewIdentityUser, Session};
use crate::error::{AppError, AppResult};
use shared::normalize_email;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
struct Account {
    user: IdentityUser,
    password: Option<String>,
}

/// Identity provider holding users and tokens in memory
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<Uuid, Account>>,
    tokens: Mutex<HashMap<String, Uuid>>,
    deleted: Mutex<Vec<Uuid>>,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    fail_sign_in: AtomicBool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing user and return a bearer token for it
    pub fn register(&self, email: &str) -> (IdentityUser, String) {
        let user = IdentityUser {
            id: Uuid::new_v4(),
            email: Some(normalize_email(email)),
            role: Some("authenticated".to_string()),
        };
        let token = format!("token-{}", user.id);
        lock(&self.accounts).insert(
            user.id,
            Account {
                user: user.clone(),
                password: None,
            },
        );
        lock(&self.tokens).insert(token.clone(), user.id);
        (user, token)
    }

    pub fn fail_create_user(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_user(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.fail_sign_in.store(fail, Ordering::SeqCst);
    }

    pub fn find_by_email(&self, email: &str) -> Option<IdentityUser> {
        let email = normalize_email(email);
        lock(&self.accounts)
            .values()
            .find(|a| a.user.email.as_deref() == Some(email.as_str()))
            .map(|a| a.user.clone())
    }

    pub fn deleted_users(&self) -> Vec<Uuid> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verify_token(&self, token: &str) -> AppResult<IdentityUser> {
        let user_id = lock(&self.tokens)
            .get(token)
            .copied()
            .ok_or_else(|| AppError::Unauthenticated("Invalid or expired token".to_string()))?;

        lock(&self.accounts)
            .get(&user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| AppError::Unauthenticated("Invalid or expired token".to_string()))
    }

    async fn create_user(&self, user: NewIdentityUser) -> AppResult<IdentityUser> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::IdentityProvider(
                "identity provider unavailable".to_string(),
            ));
        }
        if self.find_by_email(&user.email).is_some() {
            return Err(AppError::IdentityRejected(
                "A user with this email address has already been registered".to_string(),
            ));
        }

        let created = IdentityUser {
            id: Uuid::new_v4(),
            email: Some(normalize_email(&user.email)),
            role: Some("authenticated".to_string()),
        };
        lock(&self.accounts).insert(
            created.id,
            Account {
                user: created.clone(),
                password: Some(user.password),
            },
        );
        Ok(created)
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::IdentityProvider(
                "identity provider unavailable".to_string(),
            ));
        }
        lock(&self.accounts).remove(&id);
        lock(&self.tokens).retain(|_, user_id| *user_id != id);
        lock(&self.deleted).push(id);
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<Session> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(AppError::IdentityProvider(
                "identity provider unavailable".to_string(),
            ));
        }

        let email = normalize_email(email);
        let user_id = lock(&self.accounts)
            .values()
            .find(|a| {
                a.user.email.as_deref() == Some(email.as_str())
                    && a.password.as_deref() == Some(password)
            })
            .map(|a| a.user.id)
            .ok_or_else(|| AppError::IdentityRejected("Invalid login credentials".to_string()))?;

        let access_token = format!("token-{}", Uuid::new_v4());
        lock(&self.tokens).insert(access_token.clone(), user_id);
        Ok(Session {
            access_token,
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            expires_in: 3600,
            token_type: "bearer".to_string(),
        })
    }
}

/// Email sender that records every message it is asked to deliver
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered successfully, oldest first
    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<Option<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EmailDelivery("provider unavailable".to_string()));
        }
        let mut sent = lock(&self.sent);
        sent.push(message.clone());
        Ok(Some(format!("msg_{}", sent.len())))
    }
}
