/*!
 * Webhook Delivery Worker
 *
 * Consumes delivery requests from a RabbitMQ delayed-exchange queue,
 * looks up the event and subscription in PostgreSQL, POSTs a signed
 * payload to the subscriber, and drives the event through its
 * persistent state machine with bounded retries and broker-side
 * exponential backoff.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use webhookd_worker::broker::{BrokerTopology, RabbitMqBroker};
use webhookd_worker::config::WorkerConfig;
use webhookd_worker::consumer::Consumer;
use webhookd_worker::delivery::DeliveryService;
use webhookd_worker::health::{self, HealthState};
use webhookd_worker::http_client::DeliveryHttpClient;
use webhookd_worker::repository::PgWebhookRepository;

#[tokio::main]
async fn main() -> Result<()> {
    webhookd_common::init_tracing();

    info!("starting webhookd-worker");

    let config = WorkerConfig::from_env().context("failed to load configuration")?;

    info!(
        queue = %config.queue_name,
        exchange = %config.exchange_name,
        concurrency = config.consumer_concurrency,
        "configuration loaded"
    );

    info!("connecting to PostgreSQL...");
    let db_pool = webhookd_common::create_pool(
        &config.database_url,
        config.database_max_connections,
        &config.postgres_schema,
    )
    .await
    .context("failed to create database pool")?;
    info!("PostgreSQL connected");

    let repository = Arc::new(PgWebhookRepository::new(db_pool));

    let http_client = Arc::new(
        DeliveryHttpClient::new(config.http_timeout).context("failed to build HTTP client")?,
    );

    let delivery_service = Arc::new(DeliveryService::new(
        repository,
        http_client,
        config.max_attempts,
    ));

    info!("connecting to RabbitMQ...");
    let broker = Arc::new(
        RabbitMqBroker::connect(
            &config.rabbitmq_url(),
            BrokerTopology {
                exchange_name: config.exchange_name.clone(),
                queue_name: config.queue_name.clone(),
                routing_key: config.routing_key.clone(),
            },
        )
        .await
        .context("failed to connect to RabbitMQ")?,
    );
    info!("RabbitMQ connected");

    let health_state = HealthState::new();
    let health_port = config.health_port;
    let health_state_for_server = health_state.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_state_for_server).await {
            error!(error = %e, "health server failed");
        }
    });

    let liveness_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        liveness_broker.run_liveness_check(Duration::from_secs(30)).await;
    });

    let shutdown = CancellationToken::new();
    let consumer = Consumer::new(
        Arc::clone(&broker),
        delivery_service,
        config.consumer_concurrency,
        config.max_retry_delay_ms,
    );

    let consumer_shutdown = shutdown.clone();
    let consumer_handle = tokio::spawn(async move { consumer.run(consumer_shutdown).await });

    health_state.mark_ready();
    info!(port = config.health_port, "worker is ready");

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, draining in-flight deliveries");
    shutdown.cancel();

    match tokio::time::timeout(config.shutdown_grace, consumer_handle).await {
        Ok(Ok(Ok(()))) => info!("consumer drained cleanly"),
        Ok(Ok(Err(e))) => error!(error = %e, "consumer exited with an error"),
        Ok(Err(e)) => error!(error = %e, "consumer task panicked"),
        Err(_) => error!("consumer did not drain within the shutdown grace period"),
    }

    broker.close().await.context("failed to close broker connection")?;
    info!("webhookd-worker stopped");
    Ok(())
}
