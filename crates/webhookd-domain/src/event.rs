use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The message carried on the broker. Extra fields are ignored by design:
/// the service re-reads the authoritative row from storage rather than
/// trusting anything else in the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventMessage {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Pending,
    Delivered,
    Failed,
    DeadLetter,
}

/// One pending/delivered/failed delivery job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: String,
    pub webhook_id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub last_error: Option<serde_json::Value>,
    pub response_body: Option<serde_json::Value>,
    pub response_code: i32,
    pub tries: i32,
    pub status: WebhookEventStatus,
    pub failed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn is_pending(&self) -> bool {
        self.status == WebhookEventStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn reached_max_attempts(&self, max_attempts: i32) -> bool {
        self.tries >= max_attempts
    }

    /// Any 2xx status is a success.
    pub fn is_success_code(code: i32) -> bool {
        code / 100 == 2
    }

    pub fn mark_delivered(&mut self) {
        self.status = WebhookEventStatus::Delivered;
        self.delivered_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, last_error: serde_json::Value) {
        self.status = WebhookEventStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.last_error = Some(last_error);
    }

    pub fn mark_dead_letter(&mut self) {
        self.status = WebhookEventStatus::DeadLetter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_event(tries: i32) -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".to_string(),
            webhook_id: 1,
            event_type: "order.created".to_string(),
            payload: json!({"order_id": 42}),
            last_error: None,
            response_body: None,
            response_code: 0,
            tries,
            status: WebhookEventStatus::Pending,
            failed_at: None,
            delivered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn reaches_max_attempts_at_the_configured_ceiling() {
        assert!(!pending_event(4).reached_max_attempts(5));
        assert!(pending_event(5).reached_max_attempts(5));
        assert!(pending_event(6).reached_max_attempts(5));
    }

    #[test]
    fn success_code_is_any_2xx() {
        assert!(WebhookEvent::is_success_code(200));
        assert!(WebhookEvent::is_success_code(204));
        assert!(WebhookEvent::is_success_code(299));
        assert!(!WebhookEvent::is_success_code(300));
        assert!(!WebhookEvent::is_success_code(404));
    }

    #[test]
    fn mark_delivered_sets_terminal_state() {
        let mut event = pending_event(1);
        event.mark_delivered();
        assert_eq!(event.status, WebhookEventStatus::Delivered);
        assert!(event.delivered_at.is_some());
        assert!(event.is_terminal());
    }

    #[test]
    fn mark_failed_records_last_error() {
        let mut event = pending_event(5);
        event.mark_failed(json!({"error": "not found"}));
        assert_eq!(event.status, WebhookEventStatus::Failed);
        assert!(event.failed_at.is_some());
        assert_eq!(event.last_error, Some(json!({"error": "not found"})));
    }

    #[test]
    fn ignores_unknown_message_fields() {
        let msg: WebhookEventMessage =
            serde_json::from_str(r#"{"id": "evt_1", "extra": true}"#).unwrap();
        assert_eq!(msg.id, "evt_1");
    }
}
