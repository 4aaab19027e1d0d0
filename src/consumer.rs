// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module implements the per-delivery protocol every worker follows:
//! invoke the queue's handler, then ack on success or reject without requeue on
//! failure. Poison messages are dropped (or dead-lettered by broker policy)
//! rather than retried forever.

use crate::{
    errors::AmqpError,
    messaging::handler::{ConsumerHandler, ConsumerMessage},
    metrics::ConsumerMetrics,
};
use async_trait::async_trait;
use bytes::Bytes;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{BasicAckOptions, BasicRejectOptions},
    protocol::basic::AMQPProperties,
    types::AMQPValue,
};
#[cfg(test)]
use mockall::automock;
use opentelemetry::Context;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Broker-side settlement of a single delivery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<(), AmqpError>;
    async fn reject(&self, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl DeliveryAcker for Acker {
    async fn ack(&self) -> Result<(), AmqpError> {
        Acker::ack(self, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        Acker::reject(self, BasicRejectOptions { requeue })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling reject msg");
                AmqpError::RejectMessageError
            })
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected,
}

/// Runs the handler for one delivery and settles it on the broker.
///
/// The handler result decides the settlement:
/// 1. Ok: ack (multiple=false). An ack failure is reported but never requeued.
/// 2. Err: reject (requeue=false), whatever the error kind.
///
/// # Parameters
/// * `ctx` - Context extracted from the delivery headers
/// * `handler` - The queue's handler
/// * `msg` - The delivery as seen by the handler
/// * `acker` - Settlement handle of the delivery
/// * `metrics` - Outcome counters
///
/// # Returns
/// The settlement applied, or AmqpError when the broker refused it
pub(crate) async fn consume(
    ctx: &Context,
    handler: &dyn ConsumerHandler,
    msg: &ConsumerMessage,
    acker: &dyn DeliveryAcker,
    metrics: &ConsumerMetrics,
) -> Result<Settlement, AmqpError> {
    metrics.incoming.inc();

    debug!(
        queue = msg.queue,
        exchange = msg.exchange,
        delivery_tag = msg.delivery_tag,
        "received message"
    );

    match handler.exec(ctx, msg).await {
        Ok(_) => {
            metrics.success.inc();
            debug!(queue = msg.queue, "message successfully processed");
            acker.ack().await?;
            Ok(Settlement::Acked)
        }
        Err(err) => {
            metrics.error.inc();
            if err.is_permanent() {
                warn!(
                    error = err.to_string(),
                    queue = msg.queue,
                    "rejecting message that can not be processed"
                );
            } else {
                error!(
                    error = err.to_string(),
                    queue = msg.queue,
                    "error whiling handling msg, rejecting"
                );
            }

            acker.reject(false).await?;
            Ok(Settlement::Rejected)
        }
    }
}

/// Builds the handler view of a lapin delivery.
pub(crate) fn consumer_message(queue: &str, delivery: &Delivery) -> ConsumerMessage {
    ConsumerMessage {
        queue: queue.to_owned(),
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        content_type: delivery
            .properties
            .content_type()
            .as_ref()
            .map(|c| c.to_string()),
        headers: extract_headers(&delivery.properties),
        data: Bytes::copy_from_slice(&delivery.data),
        delivery_tag: delivery.delivery_tag,
    }
}

/// Flattens the application headers to strings.
///
/// Nested tables and arrays are not correlation data and are skipped.
pub(crate) fn extract_headers(props: &AMQPProperties) -> HashMap<String, String> {
    let Some(headers) = props.headers() else {
        return HashMap::new();
    };

    headers
        .inner()
        .iter()
        .filter_map(|(key, value)| header_value(value).map(|v| (key.to_string(), v)))
        .collect()
}

fn header_value(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(v) => Some(String::from_utf8_lossy(v.as_bytes()).into_owned()),
        AMQPValue::ShortString(v) => Some(v.to_string()),
        AMQPValue::Boolean(v) => Some(v.to_string()),
        AMQPValue::ShortShortInt(v) => Some(v.to_string()),
        AMQPValue::ShortShortUInt(v) => Some(v.to_string()),
        AMQPValue::ShortInt(v) => Some(v.to_string()),
        AMQPValue::ShortUInt(v) => Some(v.to_string()),
        AMQPValue::LongInt(v) => Some(v.to_string()),
        AMQPValue::LongUInt(v) => Some(v.to_string()),
        AMQPValue::LongLongInt(v) => Some(v.to_string()),
        AMQPValue::Timestamp(v) => Some(v.to_string()),
        _ => None,
    }
}
