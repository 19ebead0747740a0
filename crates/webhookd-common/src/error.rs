//! Crate-wide infrastructure error type.
//!
//! Business-level delivery outcomes (retryable vs terminal) are a separate
//! concern handled by `webhookd_worker::error::WebhookError`; this type only
//! covers the ambient failure modes shared across the worker's
//! infrastructure layers (database, serialization, configuration).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
