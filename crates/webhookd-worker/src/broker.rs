/*!
 * Broker Connector
 *
 * Wraps a single `lapin` channel over the delayed-message exchange
 * topology: a durable `x-delayed-message` exchange (fan-out as the
 * underlying routing) bound to a durable queue, with retries scheduled
 * by publishing back onto the exchange with an `x-delay` header rather
 * than sleeping in-process.
 */

use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::PublisherConfirm;
use lapin::types::{AMQPValue, FieldTable, LongLongInt, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{info, warn};

pub struct BrokerTopology {
    pub exchange_name: String,
    pub queue_name: String,
    pub routing_key: String,
}

pub struct RabbitMqBroker {
    connection: Connection,
    channel: Channel,
    topology: BrokerTopology,
}

impl RabbitMqBroker {
    pub async fn connect(url: &str, topology: BrokerTopology) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("failed to connect to RabbitMQ")?;
        let channel = connection
            .create_channel()
            .await
            .context("failed to open AMQP channel")?;

        let mut exchange_args = FieldTable::default();
        exchange_args.insert(
            ShortString::from("x-delayed-type"),
            AMQPValue::LongString("fanout".into()),
        );

        channel
            .exchange_declare(
                &topology.exchange_name,
                ExchangeKind::Custom("x-delayed-message".to_string()),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                exchange_args,
            )
            .await
            .context("failed to declare delayed exchange")?;

        channel
            .queue_declare(
                &topology.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("failed to declare queue")?;

        channel
            .queue_bind(
                &topology.queue_name,
                &topology.exchange_name,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to bind queue to delayed exchange")?;

        info!(
            exchange = %topology.exchange_name,
            queue = %topology.queue_name,
            "declared delayed-exchange topology"
        );

        Ok(Self {
            connection,
            channel,
            topology,
        })
    }

    pub async fn listen(&self) -> Result<Consumer> {
        let consumer = self
            .channel
            .basic_consume(
                &self.topology.queue_name,
                "webhookd-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to start consuming")?;

        Ok(consumer)
    }

    pub async fn publish_delayed(&self, body: &[u8], delay_ms: u64) -> Result<PublisherConfirm> {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from("x-delay"),
            AMQPValue::LongLongInt(delay_ms as LongLongInt),
        );
        let properties = BasicProperties::default().with_headers(headers);

        self.channel
            .basic_publish(
                &self.topology.exchange_name,
                &self.topology.routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .context("failed to publish delayed message")
    }

    pub async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .context("failed to ack delivery")
    }

    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .context("failed to nack delivery")
    }

    /// Idempotent: closing an already-closed channel/connection is a no-op
    /// as far as callers are concerned.
    pub async fn close(&self) -> Result<()> {
        let _ = self.channel.close(200, "shutting down").await;
        let _ = self.connection.close(200, "shutting down").await;
        Ok(())
    }

    /// Pings the channel on a fixed interval and logs a warning if it has
    /// gone away. The connector does not reconnect itself; the process is
    /// expected to crash and be restarted by its supervisor.
    pub async fn run_liveness_check(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if self.channel.status().closed() {
                warn!("AMQP channel reports closed");
            }
        }
    }
}

/// Drains a lapin delivery stream into `(body, delivery_tag)` pairs,
/// isolating the rest of the worker from lapin's message type.
pub async fn next_delivery(consumer: &mut Consumer) -> Option<Result<(Vec<u8>, u64)>> {
    let delivery = consumer.next().await?;
    Some(match delivery {
        Ok(delivery) => Ok((delivery.data.clone(), delivery.delivery_tag)),
        Err(e) => Err(anyhow::anyhow!(e).context("AMQP delivery error")),
    })
}
