//! Business-level delivery errors.
//!
//! Every path through the delivery service returns a `WebhookError`; the
//! consumer only ever reads `.retryable` to decide ack vs delayed
//! re-publish. Constructors are small associated functions rather than a
//! map of closures, one per terminal/retryable outcome.

use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone)]
pub struct WebhookError {
    pub message: String,
    pub context: Map<String, Value>,
    pub retryable: bool,
}

impl WebhookError {
    fn new(message: &str, retryable: bool, context: Map<String, Value>) -> Self {
        Self {
            message: message.to_string(),
            context,
            retryable,
        }
    }

    pub fn not_found(what: &str, id: impl Into<Value>) -> Self {
        let mut context = Map::new();
        context.insert(what.to_string(), id.into());
        Self::new("webhook event not found", false, context)
    }

    pub fn not_pending(status: &str) -> Self {
        let mut context = Map::new();
        context.insert("status".to_string(), json!(status));
        Self::new("webhook event is not pending", false, context)
    }

    pub fn reached_max_attempts(tries: i32) -> Self {
        let mut context = Map::new();
        context.insert("tries".to_string(), json!(tries));
        Self::new("webhook event reached max attempts", false, context)
    }

    pub fn disabled() -> Self {
        Self::new("webhook is disabled", false, Map::new())
    }

    pub fn serialization_failed(cause: impl fmt::Display) -> Self {
        let mut context = Map::new();
        context.insert("error".to_string(), json!(cause.to_string()));
        Self::new(
            "webhook event payload serialization failed",
            false,
            context,
        )
    }

    pub fn fails() -> Self {
        Self::new("webhook event delivery entered failed state", false, Map::new())
    }

    pub fn will_retry(code: i32, tries: i32) -> Self {
        let mut context = Map::new();
        context.insert("response_code".to_string(), json!(code));
        context.insert("tries".to_string(), json!(tries));
        Self::new("webhook event will retry", true, context)
    }

    /// `tries` the consumer should feed into the backoff schedule, if this
    /// error carries one.
    pub fn tries(&self) -> Option<i32> {
        self.context.get("tries").and_then(Value::as_i64).map(|v| v as i32)
    }

    pub fn delivery_failed(cause: impl fmt::Display) -> Self {
        let mut context = Map::new();
        context.insert("error".to_string(), json!(cause.to_string()));
        Self::new("webhook event delivery failed", true, context)
    }
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.context)
    }
}

impl std::error::Error for WebhookError {}
