//! Wire and storage types shared between the worker and its tests.
//!
//! Kept free of business logic beyond the small state-machine predicates
//! that are part of the data's own invariants (`is_pending`,
//! `reached_max_attempts`, ...). The orchestration that decides *when* to
//! call them lives in `webhookd-worker::delivery`.

pub mod event;
pub mod webhook;

pub use event::{WebhookEvent, WebhookEventMessage, WebhookEventStatus};
pub use webhook::{Webhook, WebhookStatus};

/// Maximum number of delivery attempts before an event is terminal.
pub const MAX_WEBHOOK_SEND_ATTEMPTS: i32 = 5;
