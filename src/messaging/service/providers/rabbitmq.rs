//! # RabbitMQ Messaging Provider
//!
//! RabbitMQ implementation of the `MessagingService` trait using the `lapin` crate.
//!
//! Topology is a single durable topic exchange with durable queues bound per
//! routing key. Events are published persistent (delivery mode 2) as JSON on
//! a channel in confirm mode, so a publish succeeds only on a broker ack.
//! Consumption uses `basic_consume` with manual acks so the broker only drops
//! a message once the consumer has settled it.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use crate::config::loader::redact_url;
use crate::config::BrokerConfig;
use crate::messaging::message::{InboundMessage, LifecycleEvent, ReceiptHandle};
use crate::messaging::service::traits::{DeliveryStream, MessagingService};
use crate::messaging::{MessagingError, MessagingResult};

static CONSUMER_SEQ: AtomicU64 = AtomicU64::new(1);

/// RabbitMQ-based messaging service
#[derive(Debug)]
pub struct RabbitMqMessagingService {
    connection: Connection,
    channel: Channel,
    connection_name: String,
}

impl RabbitMqMessagingService {
    /// Open a connection and channel in a single attempt
    ///
    /// Callers wanting bounded retries go through
    /// [`crate::messaging::connect_with_backoff`].
    pub async fn connect(config: &BrokerConfig) -> MessagingResult<Self> {
        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default()
                .with_connection_name(config.connection_name.clone().into()),
        )
        .await
        .map_err(|e| {
            MessagingError::connection(format!(
                "RabbitMQ connection to {} failed: {}",
                redact_url(&config.url),
                e
            ))
        })?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {}", e))
        })?;

        // One unacknowledged delivery at a time
        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::connection(format!("Failed to set QoS: {}", e)))?;

        // Publishes resolve only once the broker acks or nacks them
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::connection(format!("Failed to enable publisher confirms: {}", e))
            })?;

        info!(
            url = %redact_url(&config.url),
            connection_name = %config.connection_name,
            prefetch = config.prefetch_count,
            "RabbitMQ channel established"
        );

        Ok(Self {
            connection,
            channel,
            connection_name: config.connection_name.clone(),
        })
    }

    fn check_confirmation(
        exchange: &str,
        routing_key: &str,
        confirmation: Confirmation,
    ) -> MessagingResult<()> {
        match confirmation {
            Confirmation::Ack(_) => Ok(()),
            Confirmation::Nack(_) => Err(MessagingError::publish(
                exchange,
                routing_key,
                "broker nacked the publish",
            )),
            Confirmation::NotRequested => Err(MessagingError::publish(
                exchange,
                routing_key,
                "channel is not in confirm mode",
            )),
        }
    }

    fn parse_delivery_tag(receipt: &ReceiptHandle) -> MessagingResult<u64> {
        receipt.as_str().parse().map_err(|_| {
            MessagingError::internal(format!("invalid delivery tag: {}", receipt.as_str()))
        })
    }
}

#[async_trait]
impl MessagingService for RabbitMqMessagingService {
    async fn ensure_exchange(&self, exchange: &str) -> MessagingResult<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::topology(exchange, format!("exchange declaration failed: {}", e))
            })?;

        debug!(exchange = %exchange, "Topic exchange asserted");
        Ok(())
    }

    async fn ensure_queue(
        &self,
        queue_name: &str,
        exchange: &str,
        routing_keys: &[String],
    ) -> MessagingResult<()> {
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::topology(queue_name, format!("queue declaration failed: {}", e))
            })?;

        for routing_key in routing_keys {
            self.channel
                .queue_bind(
                    queue_name,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MessagingError::topology(
                        queue_name,
                        format!("binding to {}/{} failed: {}", exchange, routing_key, e),
                    )
                })?;
        }

        debug!(
            queue = %queue_name,
            exchange = %exchange,
            routing_keys = ?routing_keys,
            "Queue asserted and bound"
        );
        Ok(())
    }

    async fn publish(&self, exchange: &str, event: &LifecycleEvent) -> MessagingResult<()> {
        let delivery_mode = if event.persistent { 2 } else { 1 };

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                &event.routing_key,
                BasicPublishOptions::default(),
                &event.payload,
                BasicProperties::default()
                    .with_delivery_mode(delivery_mode)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| MessagingError::publish(exchange, &event.routing_key, e.to_string()))?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::publish(
                exchange,
                &event.routing_key,
                format!("confirmation failed: {}", e),
            )
        })?;

        Self::check_confirmation(exchange, &event.routing_key, confirmation)
    }

    async fn subscribe(&self, queue_name: &str) -> MessagingResult<DeliveryStream> {
        let consumer_tag = format!(
            "{}-{}",
            self.connection_name,
            CONSUMER_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let consumer = self
            .channel
            .basic_consume(
                queue_name,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::receive(queue_name, format!("basic_consume failed: {}", e)))?;

        info!(queue = %queue_name, consumer_tag = %consumer_tag, "Consumer registered");

        let queue = queue_name.to_string();
        let stream = consumer.map(move |delivery| match delivery {
            Ok(mut delivery) => Ok(InboundMessage {
                routing_key: delivery.routing_key.as_str().to_string(),
                payload: std::mem::take(&mut delivery.data),
                redelivered: delivery.redelivered,
                receipt: ReceiptHandle::from(delivery.delivery_tag),
            }),
            Err(e) => Err(MessagingError::receive(&queue, e.to_string())),
        });

        Ok(stream.boxed())
    }

    async fn ack(&self, queue_name: &str, receipt: &ReceiptHandle) -> MessagingResult<()> {
        let delivery_tag = Self::parse_delivery_tag(receipt)?;
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::ack(queue_name, receipt.as_str(), e.to_string()))
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
        requeue: bool,
    ) -> MessagingResult<()> {
        let delivery_tag = Self::parse_delivery_tag(receipt)?;
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| MessagingError::nack(queue_name, receipt.as_str(), e.to_string()))
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        if self.connection.status().connected() {
            Ok(true)
        } else {
            Err(MessagingError::health_check(
                "RabbitMQ connection is not connected",
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}
