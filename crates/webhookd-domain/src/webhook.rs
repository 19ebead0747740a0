use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscriber's webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    pub id: i64,
    pub callback_url: String,
    pub secret: String,
    pub status: WebhookStatus,
    pub subscribed_events: Vec<String>,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum WebhookStatus {
    Active,
    Disabled,
}

impl Webhook {
    /// A disabled subscription must never receive delivery attempts.
    pub fn is_active(&self) -> bool {
        self.status == WebhookStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(status: WebhookStatus) -> Webhook {
        Webhook {
            id: 1,
            callback_url: "https://example.com/hook".to_string(),
            secret: "s3cr3t".to_string(),
            status,
            subscribed_events: vec!["order.created".to_string()],
            failure_count: 0,
            last_failure_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn active_webhook_is_active() {
        assert!(webhook(WebhookStatus::Active).is_active());
    }

    #[test]
    fn disabled_webhook_is_not_active() {
        assert!(!webhook(WebhookStatus::Disabled).is_active());
    }
}
