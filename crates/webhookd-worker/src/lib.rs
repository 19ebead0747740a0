//! # Webhook Delivery Worker
//!
//! Consumes delivery requests from a durable broker, loads the
//! associated event and subscription from storage, POSTs a signed
//! payload to the subscriber, and drives the event through its
//! persistent state machine with bounded retries and broker-side
//! exponential backoff.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod health;
pub mod http_client;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod signer;

pub use config::WorkerConfig;
pub use delivery::DeliveryService;
pub use error::WebhookError;
pub use repository::{PgWebhookRepository, WebhookRepository};
