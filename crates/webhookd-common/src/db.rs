//! Database connection pool management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Create a PostgreSQL connection pool and set the search_path to
/// `schema` on every connection pulled from it.
pub async fn create_pool(database_url: &str, max_connections: u32, schema: &str) -> Result<PgPool> {
    info!(max_connections, schema, "creating database pool");

    let schema = schema.to_string();
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                sqlx::Executor::execute(
                    conn,
                    format!("SET search_path = \"{schema}\"").as_str(),
                )
                .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    info!("database pool created");
    Ok(pool)
}

/// A lightweight liveness probe, `SELECT 1`.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    if row.0 == 1 {
        Ok(())
    } else {
        Err(crate::error::Error::Config(
            "database health check returned unexpected value".to_string(),
        ))
    }
}
