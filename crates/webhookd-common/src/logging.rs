//! Structured logging setup, backed by `tracing`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize compact, human-readable logging.
///
/// Reads `RUST_LOG` (falls back to `info`) the same way every other
/// service in this deployment does, so operators don't need a
/// service-specific env var to turn up verbosity.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .compact(),
        )
        .init();
}

/// Initialize JSON-formatted logging, for log aggregation in production.
pub fn init_tracing_json() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_current_span(true),
        )
        .init();
}

/// Pick compact vs JSON based on the `LOG_FORMAT` environment variable.
pub fn init_from_env() {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => init_tracing_json(),
        _ => init_tracing(),
    }
}
