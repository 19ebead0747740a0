/*!
 * Consumer
 *
 * Drains the broker's delivery stream and dispatches each message onto a
 * bounded `JoinSet` so a slow subscriber never head-of-line-blocks the
 * rest of the queue. A single consume loop feeds the task pool, rather
 * than N independent polling loops, since lapin's `basic_consume` already
 * multiplexes deliveries over one channel.
 */

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use webhookd_domain::{WebhookEvent, WebhookEventMessage};

use crate::broker::{next_delivery, RabbitMqBroker};
use crate::delivery::DeliveryService;
use crate::error::WebhookError;
use crate::repository::WebhookRepository;
use crate::retry::next_delay_ms;

/// What to do with an in-flight delivery once `send_webhook` has returned.
/// Pulled out of `handle_one` so the outcome-to-action translation can be
/// tested without a broker.
#[derive(Debug, Clone, PartialEq)]
enum DeliveryAction {
    Ack,
    RepublishThenAck { tries: u32, delay_ms: u64 },
}

/// Decide what the consumer should do with a delivery given the result of
/// one `send_webhook` attempt. Never touches the broker itself.
fn decide(result: &Result<WebhookEvent, WebhookError>, max_retry_delay_ms: u64) -> DeliveryAction {
    match result {
        Ok(_) => DeliveryAction::Ack,
        Err(err) if err.retryable => {
            let tries = err.tries().unwrap_or(1).max(0) as u32;
            let delay_ms = next_delay_ms(tries, max_retry_delay_ms);
            DeliveryAction::RepublishThenAck { tries, delay_ms }
        }
        Err(_) => DeliveryAction::Ack,
    }
}

pub struct Consumer<R: WebhookRepository + 'static> {
    broker: Arc<RabbitMqBroker>,
    delivery: Arc<DeliveryService<R>>,
    concurrency: usize,
    max_retry_delay_ms: u64,
}

impl<R: WebhookRepository + 'static> Consumer<R> {
    pub fn new(
        broker: Arc<RabbitMqBroker>,
        delivery: Arc<DeliveryService<R>>,
        concurrency: usize,
        max_retry_delay_ms: u64,
    ) -> Self {
        Self {
            broker,
            delivery,
            concurrency,
            max_retry_delay_ms,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut lapin_consumer = self.broker.listen().await?;
        let mut tasks: JoinSet<()> = JoinSet::new();

        info!(concurrency = self.concurrency, "consumer loop started");

        loop {
            while tasks.len() >= self.concurrency {
                tasks.join_next().await;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, draining in-flight deliveries");
                    break;
                }
                next = next_delivery(&mut lapin_consumer) => {
                    match next {
                        None => {
                            warn!("broker delivery stream ended");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "error reading delivery from broker");
                            continue;
                        }
                        Some(Ok((body, delivery_tag))) => {
                            let broker = Arc::clone(&self.broker);
                            let delivery = Arc::clone(&self.delivery);
                            let max_retry_delay_ms = self.max_retry_delay_ms;
                            let shutdown = shutdown.clone();
                            tasks.spawn(async move {
                                handle_one(broker, delivery, body, delivery_tag, max_retry_delay_ms, shutdown).await;
                            });
                        }
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}

async fn handle_one<R: WebhookRepository + 'static>(
    broker: Arc<RabbitMqBroker>,
    delivery: Arc<DeliveryService<R>>,
    body: Vec<u8>,
    delivery_tag: u64,
    max_retry_delay_ms: u64,
    shutdown: CancellationToken,
) {
    // 1. Decode. An un-processable message can never succeed; ack and move on.
    let msg: WebhookEventMessage = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(e) => {
            crate::metrics::MESSAGES_CONSUMED_TOTAL
                .with_label_values(&["decode_error"])
                .inc();
            warn!(error = %e, "failed to decode delivery message, acking and dropping");
            ack(&broker, delivery_tag).await;
            return;
        }
    };
    crate::metrics::MESSAGES_CONSUMED_TOTAL
        .with_label_values(&["decoded"])
        .inc();

    if shutdown.is_cancelled() {
        // Never start a POST after shutdown has been requested; let the
        // broker's own redelivery pick this message up on the next run.
        let _ = broker.nack(delivery_tag, true).await;
        return;
    }

    // 2. Attempt delivery.
    let result = delivery.send_webhook(&msg).await;
    let action = decide(&result, max_retry_delay_ms);

    // 3. Log and record the outcome. Ack-then-republish, never nack for
    // retry scheduling; the delayed exchange is the single source of backoff.
    match result {
        Ok(event) => {
            crate::metrics::DELIVERY_ATTEMPTS_TOTAL
                .with_label_values(&["delivered"])
                .inc();
            crate::metrics::HTTP_RESPONSES_TOTAL
                .with_label_values(&[&event.response_code.to_string()])
                .inc();
            debug!(event_id = %event.id, "delivery succeeded");
        }
        Err(ref err) if !err.retryable => {
            crate::metrics::DELIVERY_ATTEMPTS_TOTAL
                .with_label_values(&["terminal"])
                .inc();
            warn!(message = %err.message, "delivery terminated non-retryably");
        }
        Err(_) => {}
    }

    match action {
        DeliveryAction::Ack => ack(&broker, delivery_tag).await,
        DeliveryAction::RepublishThenAck { tries, delay_ms } => {
            crate::metrics::RETRY_SCHEDULED_TOTAL
                .with_label_values(&[&tries.to_string()])
                .inc();
            if let Err(e) = broker.publish_delayed(&body, delay_ms).await {
                error!(error = %e, "failed to publish delayed retry, leaving message unacked for broker redelivery");
                let _ = broker.nack(delivery_tag, true).await;
                return;
            }
            debug!(delay_ms, "scheduled delayed retry");
            ack(&broker, delivery_tag).await;
        }
    }
}

async fn ack(broker: &RabbitMqBroker, delivery_tag: u64) {
    if let Err(e) = broker.ack(delivery_tag).await {
        error!(error = %e, "failed to ack delivery");
    }
}
