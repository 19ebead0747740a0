/*!
 * Repository
 *
 * Point reads and scoped updates of `Webhook`/`WebhookEvent`, plus a
 * short transaction type for the attempt-counter bump. No implicit
 * context-carried transaction (a duck-typed context value piggybacking
 * the active transaction is exactly the pattern to avoid); `WebhookTx` is
 * instead an explicit handle returned by `begin()` and consumed by value,
 * so using it twice or forgetting to commit is a compile-time or an
 * explicit-rollback concern, never ambient magic.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use thiserror::Error;

use webhookd_domain::{Webhook, WebhookEvent, WebhookEventStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("row not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Only the `Some` fields are written; `tries` may be written as an
/// absolute value through this path (distinct from the dedicated
/// transactional `WebhookTx::bump_tries`, which is the only place `tries`
/// is incremented relative to its current value).
#[derive(Debug, Default, Clone)]
pub struct WebhookEventPatch {
    pub tries: Option<i32>,
    pub status: Option<WebhookEventStatus>,
    pub response_code: Option<i32>,
    pub response_body: Option<Value>,
    pub last_error: Option<Value>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl WebhookEventPatch {
    pub fn is_empty(&self) -> bool {
        self.tries.is_none()
            && self.status.is_none()
            && self.response_code.is_none()
            && self.response_body.is_none()
            && self.last_error.is_none()
            && self.delivered_at.is_none()
            && self.failed_at.is_none()
    }
}

/// A short transaction carrying the pre-POST attempt-counter bump. An
/// explicit handle returned by `begin()` and consumed by value, never an
/// ambient context-carried transaction, so a fake can stand in for tests
/// without a live Postgres connection behind it.
#[async_trait]
pub trait WebhookTx: Send {
    /// Increment `tries` by one and persist it, inside this transaction.
    async fn bump_tries(&mut self, event_id: &str) -> Result<i32, RepoError>;
    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}

pub struct PgWebhookTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl WebhookTx for PgWebhookTx {
    async fn bump_tries(&mut self, event_id: &str) -> Result<i32, RepoError> {
        let row: (i32,) = sqlx::query_as(
            "UPDATE webhook_events SET tries = tries + 1, updated_at = now() \
             WHERE id = $1 RETURNING tries",
        )
        .bind(event_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.0)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn get_webhook(&self, id: i64) -> Result<Webhook, RepoError>;
    async fn get_webhook_event(&self, id: &str) -> Result<WebhookEvent, RepoError>;
    async fn update_webhook_event(
        &self,
        id: &str,
        patch: WebhookEventPatch,
    ) -> Result<(), RepoError>;
    async fn begin(&self) -> Result<Box<dyn WebhookTx>, RepoError>;
}

pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn get_webhook(&self, id: i64) -> Result<Webhook, RepoError> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_webhook_event(&self, id: &str) -> Result<WebhookEvent, RepoError> {
        sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn update_webhook_event(
        &self,
        id: &str,
        patch: WebhookEventPatch,
    ) -> Result<(), RepoError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut builder = sqlx::QueryBuilder::new("UPDATE webhook_events SET ");
        let mut first = true;

        macro_rules! set_field {
            ($name:literal, $value:expr) => {
                if !first {
                    builder.push(", ");
                }
                first = false;
                builder.push($name).push(" = ").push_bind($value);
            };
        }

        if let Some(tries) = patch.tries {
            set_field!("tries", tries);
        }
        if let Some(status) = patch.status {
            set_field!("status", status);
        }
        if let Some(code) = patch.response_code {
            set_field!("response_code", code);
        }
        if let Some(body) = patch.response_body {
            set_field!("response_body", body);
        }
        if let Some(err) = patch.last_error {
            set_field!("last_error", err);
        }
        if let Some(at) = patch.delivered_at {
            set_field!("delivered_at", at);
        }
        if let Some(at) = patch.failed_at {
            set_field!("failed_at", at);
        }

        if !first {
            builder.push(", ");
        }
        builder.push("updated_at = now() WHERE id = ").push_bind(id.to_string());

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn WebhookTx>, RepoError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgWebhookTx { tx }))
    }
}
