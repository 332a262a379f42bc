//! PostgreSQL implementation of the onboarding store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{OnboardingStore, MEMBER_EXISTS, PENDING_INVITATION_EXISTS};
use crate::error::{AppError, AppResult};
use crate::models::{
    Address, Business, BusinessUser, Invitation, NewAddress, NewBusiness, NewBusinessUser,
    NewInvitation, NewOutboxMessage, OutboxMessage,
};

const INVITATION_COLUMNS: &str = r#"
    id, business_id, email, first_name, last_name, role, status, expires_at,
    sent_at, accepted_at, resent_count, last_resent_at, created_by, created_at, updated_at
"#;

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Map a unique violation to `Conflict`, keeping other errors as database errors
fn unique_as_conflict(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |err| {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(message.to_string());
            }
        }
        AppError::Database(err)
    }
}

/// Map a foreign key violation on the business type to a caller error
fn unknown_business_type(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return AppError::BadRequest(
                "business_type_id does not reference a known business type".to_string(),
            );
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl OnboardingStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_address(&self, address: NewAddress) -> AppResult<Address> {
        let address = sqlx::query_as::<_, Address>(
            r#"
            INSERT INTO addresses
                (address_line_1, address_line_2, city, country, postal_code,
                 latitude, longitude, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, address_line_1, address_line_2, city, country, postal_code,
                      latitude, longitude, is_verified, created_by, created_at, updated_at
            "#,
        )
        .bind(&address.address_line_1)
        .bind(&address.address_line_2)
        .bind(&address.city)
        .bind(&address.country)
        .bind(&address.postal_code)
        .bind(address.latitude)
        .bind(address.longitude)
        .bind(address.created_by)
        .fetch_one(&self.db)
        .await?;

        Ok(address)
    }

    async fn delete_address(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn insert_business(&self, business: NewBusiness) -> AppResult<Business> {
        sqlx::query_as::<_, Business>(
            r#"
            INSERT INTO businesses
                (name, business_type_id, address_id, license_number, pdv_number, tax_id,
                 company_number, is_pdv_registered, accepts_bookings,
                 default_booking_commission, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING id, name, business_type_id, address_id, license_number, pdv_number,
                      tax_id, company_number, is_pdv_registered, accepts_bookings,
                      default_booking_commission, status, created_by, updated_by,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(&business.name)
        .bind(business.business_type_id)
        .bind(business.address_id)
        .bind(&business.license_number)
        .bind(&business.pdv_number)
        .bind(&business.tax_id)
        .bind(&business.company_number)
        .bind(business.is_pdv_registered)
        .bind(business.accepts_bookings)
        .bind(business.default_booking_commission)
        .bind(business.created_by)
        .fetch_one(&self.db)
        .await
        .map_err(unknown_business_type)
    }

    async fn get_business(&self, id: Uuid) -> AppResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, name, business_type_id, address_id, license_number, pdv_number,
                   tax_id, company_number, is_pdv_registered, accepts_bookings,
                   default_booking_commission, status, created_by, updated_by,
                   created_at, updated_at, deleted_at
            FROM businesses
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(business)
    }

    async fn business_type_name(&self, id: Uuid) -> AppResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM business_types WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(name)
    }

    async fn insert_invitation(&self, invitation: NewInvitation) -> AppResult<Invitation> {
        let sql = format!(
            r#"
            INSERT INTO invitations
                (business_id, email, first_name, last_name, role, expires_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            INVITATION_COLUMNS
        );

        sqlx::query_as::<_, Invitation>(&sql)
            .bind(invitation.business_id)
            .bind(&invitation.email)
            .bind(&invitation.first_name)
            .bind(&invitation.last_name)
            .bind(invitation.role)
            .bind(invitation.expires_at)
            .bind(invitation.created_by)
            .fetch_one(&self.db)
            .await
            .map_err(unique_as_conflict(PENDING_INVITATION_EXISTS))
    }

    async fn get_invitation(&self, id: Uuid) -> AppResult<Option<Invitation>> {
        let sql = format!("SELECT {} FROM invitations WHERE id = $1", INVITATION_COLUMNS);
        let invitation = sqlx::query_as::<_, Invitation>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(invitation)
    }

    async fn find_live_invitation(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Invitation>> {
        let sql = format!(
            r#"
            SELECT {} FROM invitations
            WHERE business_id = $1
              AND lower(email) = lower($2)
              AND status = 'pending'
              AND expires_at > $3
            LIMIT 1
            "#,
            INVITATION_COLUMNS
        );
        let invitation = sqlx::query_as::<_, Invitation>(&sql)
            .bind(business_id)
            .bind(email)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(invitation)
    }

    async fn expire_stale_invitations(
        &self,
        business_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'expired', updated_at = $3
            WHERE business_id = $1
              AND lower(email) = lower($2)
              AND status = 'pending'
              AND expires_at <= $3
            "#,
        )
        .bind(business_id)
        .bind(email)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_invitation_sent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE invitations SET sent_at = $2, updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_invitation_resent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Invitation> {
        let sql = format!(
            r#"
            UPDATE invitations
            SET resent_count = resent_count + 1,
                last_resent_at = $2,
                sent_at = $2,
                updated_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            INVITATION_COLUMNS
        );
        sqlx::query_as::<_, Invitation>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invitation is no longer pending".to_string()))
    }

    async fn mark_invitation_expired(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'expired', updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_invitation_accepted(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'accepted', accepted_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_invitations(&self, business_id: Uuid) -> AppResult<Vec<Invitation>> {
        let sql = format!(
            "SELECT {} FROM invitations WHERE business_id = $1 ORDER BY created_at DESC",
            INVITATION_COLUMNS
        );
        let invitations = sqlx::query_as::<_, Invitation>(&sql)
            .bind(business_id)
            .fetch_all(&self.db)
            .await?;
        Ok(invitations)
    }

    async fn active_member_exists(&self, business_id: Uuid, email: &str) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM business_users
                WHERE business_id = $1
                  AND lower(email) = lower($2)
                  AND is_active = true
                  AND deleted_at IS NULL
            )
            "#,
        )
        .bind(business_id)
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn insert_business_user(&self, user: NewBusinessUser) -> AppResult<BusinessUser> {
        sqlx::query_as::<_, BusinessUser>(
            r#"
            INSERT INTO business_users
                (business_id, user_id, role, first_name, last_name, email, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, business_id, user_id, role, first_name, last_name, email,
                      is_active, created_by, created_at, updated_at, deleted_at
            "#,
        )
        .bind(user.business_id)
        .bind(user.user_id)
        .bind(user.role)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.created_by)
        .fetch_one(&self.db)
        .await
        .map_err(unique_as_conflict(MEMBER_EXISTS))
    }

    async fn is_platform_admin(&self, user_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM platform_admins
                WHERE user_id = $1 AND is_active = true AND deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn is_business_admin(&self, user_id: Uuid, business_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM business_users
                WHERE user_id = $1
                  AND business_id = $2
                  AND role = 'admin'
                  AND is_active = true
                  AND deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(business_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn enqueue_email(&self, message: NewOutboxMessage) -> AppResult<OutboxMessage> {
        let message = sqlx::query_as::<_, OutboxMessage>(
            r#"
            INSERT INTO email_outbox
                (kind, invitation_id, recipient, subject, html_body, text_body,
                 from_address, reply_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(message.kind)
        .bind(message.invitation_id)
        .bind(&message.recipient)
        .bind(&message.subject)
        .bind(&message.html_body)
        .bind(&message.text_body)
        .bind(&message.from_address)
        .bind(&message.reply_to)
        .fetch_one(&self.db)
        .await?;

        Ok(message)
    }

    async fn mark_email_sent(
        &self,
        id: Uuid,
        provider_message_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE email_outbox
            SET status = 'sent', provider_message_id = $2, sent_at = $3,
                attempts = attempts + 1, last_error = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_email_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE email_outbox
            SET status = 'failed', attempts = attempts + 1, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn retryable_emails(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> AppResult<Vec<OutboxMessage>> {
        let messages = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT o.* FROM email_outbox o
            LEFT JOIN invitations i ON i.id = o.invitation_id
            WHERE o.status = 'failed'
              AND o.kind <> 'invitation_resend'
              AND o.attempts < $1
              AND (
                o.invitation_id IS NULL
                OR (i.status = 'pending' AND i.expires_at > NOW() AND i.sent_at IS NULL)
              )
            ORDER BY o.created_at
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(messages)
    }
}
