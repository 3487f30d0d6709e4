//! The broker-publish seam. `LapinPublisher` owns a single lazily-opened
//! AMQP channel per process; a failed publish drops the channel so the next
//! call reopens it. `NullPublisher` always fails, for exercising the outbox
//! dispatcher's failure/backoff path without a broker.

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::server::BrokerConfig;

use super::envelope::EventEnvelope;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_event(&self, envelope: &EventEnvelope) -> bool;
}

pub struct LapinPublisher {
    config: BrokerConfig,
    channel: Mutex<Option<Channel>>,
}

impl LapinPublisher {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config, channel: Mutex::new(None) }
    }

    async fn ensure_channel(&self) -> Option<Channel> {
        if let Some(channel) = self.channel.lock().clone() {
            if channel.status().connected() {
                return Some(channel);
            }
        }

        let connection =
            match Connection::connect(&self.config.amqp_url, ConnectionProperties::default()).await {
                Ok(conn) => conn,
                Err(err) => {
                    error!(error = %err, "failed to connect to broker");
                    return None;
                }
            };

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                error!(error = %err, "failed to open broker channel");
                return None;
            }
        };

        if let Err(err) = channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
        {
            error!(error = %err, "failed to declare exchange");
            return None;
        }

        if let Err(err) = channel
            .queue_declare(
                &self.config.events_queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
        {
            error!(error = %err, "failed to declare queue");
            return None;
        }

        if let Err(err) = channel
            .queue_bind(
                &self.config.events_queue,
                &self.config.exchange,
                &self.config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            error!(error = %err, "failed to bind queue");
            return None;
        }

        *self.channel.lock() = Some(channel.clone());
        Some(channel)
    }
}

#[async_trait]
impl Publisher for LapinPublisher {
    async fn publish_event(&self, envelope: &EventEnvelope) -> bool {
        let Some(channel) = self.ensure_channel().await else {
            return false;
        };

        let body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(err) => {
                error!(error = %err, "failed to serialize envelope");
                return false;
            }
        };

        let result = channel
            .basic_publish(
                &self.config.exchange,
                &self.config.routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await;

        match result {
            Ok(confirm) => match confirm.await {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, correlation_id = %envelope.correlation_id, "publish confirmation failed");
                    *self.channel.lock() = None;
                    false
                }
            },
            Err(err) => {
                warn!(error = %err, correlation_id = %envelope.correlation_id, "publish failed");
                *self.channel.lock() = None;
                false
            }
        }
    }
}

/// Always fails — used in tests that need to exercise the dispatcher's
/// retry/backoff path without a live broker.
#[derive(Default)]
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish_event(&self, _envelope: &EventEnvelope) -> bool {
        false
    }
}
