// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module publishes messages to RabbitMQ exchanges with durable-message
//! semantics. Every call opens a fresh channel on the shared connection, enables
//! publisher confirms, publishes a persistent message and closes the channel, so
//! a broken channel never poisons later publishes.

use crate::{
    channel::{close_channel, open_channel},
    messaging::{
        errors::MessagingError,
        publisher::{PublishMessage, Publisher},
    },
    metrics::PublisherMetrics,
    otel,
};
use async_trait::async_trait;
use chrono::Utc;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection,
};
use opentelemetry::Context;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error};
use uuid::Uuid;

/// AMQP delivery mode for messages that survive a broker restart.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// RabbitMQ implementation of the Publisher trait.
pub struct RabbitMQPublisher {
    conn: Arc<Connection>,
    metrics: PublisherMetrics,
    timeout: Option<Duration>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `conn` - The shared connection to the RabbitMQ server
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(conn: Arc<Connection>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher {
            conn,
            metrics: PublisherMetrics::global(),
            timeout: None,
        })
    }

    /// Creates a publisher that aborts publishes taking longer than `timeout`.
    pub fn with_timeout(conn: Arc<Connection>, timeout: Duration) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher {
            conn,
            metrics: PublisherMetrics::global(),
            timeout: Some(timeout),
        })
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    /// Publishes a message to RabbitMQ.
    ///
    /// The message is persistent and carries a fresh `message_id`, the current
    /// UTC timestamp, the given content type and the given headers plus the
    /// propagated trace context.
    ///
    /// # Parameters
    /// * `ctx` - OpenTelemetry context for tracing
    /// * `msg` - Exchange, routing key, content type, headers and body
    ///
    /// # Returns
    /// Ok(()) once the broker confirmed the message, or MessagingError
    async fn publish(&self, ctx: &Context, msg: &PublishMessage) -> Result<(), MessagingError> {
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.publish_once(ctx, msg))
                .await
                .unwrap_or(Err(MessagingError::PublishTimeout)),
            None => self.publish_once(ctx, msg).await,
        };

        match &result {
            Ok(_) => {
                self.metrics.published.inc();
                debug!(exchange = msg.to, key = msg.key, "message published");
            }
            Err(err) => {
                self.metrics.errors.inc();
                error!(
                    error = err.to_string(),
                    exchange = msg.to,
                    key = msg.key,
                    "error publishing message"
                );
            }
        }

        result
    }
}

impl RabbitMQPublisher {
    async fn publish_once(
        &self,
        ctx: &Context,
        msg: &PublishMessage,
    ) -> Result<(), MessagingError> {
        let channel = open_channel(&self.conn)
            .await
            .map_err(|err| MessagingError::PublisherError(err.to_string()))?;

        let result = publish_on(&channel, ctx, msg).await;

        if let Err(err) = close_channel(&channel).await {
            error!(error = err.to_string(), "error closing publish channel");
        }

        result
    }
}

async fn publish_on(
    channel: &Channel,
    ctx: &Context,
    msg: &PublishMessage,
) -> Result<(), MessagingError> {
    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await
        .map_err(|err| MessagingError::PublisherError(err.to_string()))?;

    let confirm = channel
        .basic_publish(
            &msg.to,
            &msg.key,
            BasicPublishOptions {
                immediate: false,
                mandatory: false,
            },
            &msg.data,
            properties(ctx, msg),
        )
        .await
        .map_err(|err| MessagingError::PublisherError(err.to_string()))?;

    let confirmation = confirm
        .await
        .map_err(|err| MessagingError::PublisherError(err.to_string()))?;

    if confirmation.is_nack() {
        return Err(MessagingError::PublishNotConfirmed);
    }

    Ok(())
}

/// Builds the AMQP properties of an outbound message.
pub(crate) fn properties(ctx: &Context, msg: &PublishMessage) -> BasicProperties {
    let mut headers = header_table(&msg.headers);
    otel::inject_context(ctx, &mut headers);

    let mut props = BasicProperties::default()
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_timestamp(Utc::now().timestamp() as u64)
        .with_headers(FieldTable::from(headers));

    if let Some(content_type) = &msg.content_type {
        props = props.with_content_type(ShortString::from(content_type.clone()));
    }

    props
}

/// Converts string headers to an AMQP field table.
fn header_table(headers: &HashMap<String, String>) -> BTreeMap<ShortString, AMQPValue> {
    headers
        .iter()
        .map(|(key, value)| {
            (
                ShortString::from(key.clone()),
                AMQPValue::LongString(LongString::from(value.clone())),
            )
        })
        .collect()
}
