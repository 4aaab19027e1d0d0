// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! Utilities for propagating trace context through RabbitMQ message headers,
//! extracting context from incoming deliveries, and creating consumer spans.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global::BoxedTracer,
    propagation::{Extractor, Injector},
    trace::{SpanKind, TraceContextExt, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// An adapter for injecting and extracting OpenTelemetry context from RabbitMQ headers.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    /// Sets a trace context key-value pair in the message headers.
    ///
    /// Keys already present are left untouched so application headers such as
    /// the correlation UUID always win over propagation fields.
    fn set(&mut self, key: &str, value: String) {
        let key = ShortString::from(key.to_lowercase());
        if self.headers.contains_key(&key) {
            return;
        }

        self.headers.insert(key, AMQPValue::LongString(value.into()));
    }
}

impl Extractor for RabbitMQTracePropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| match header_value {
            AMQPValue::LongString(value) => std::str::from_utf8(value.as_bytes())
                .map_err(|e| error!("Error decoding header value {:?}", e))
                .ok(),
            AMQPValue::ShortString(value) => Some(value.as_str()),
            _ => None,
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Opens a consumer span for a delivery.
///
/// The parent is extracted from the delivery headers; the returned context
/// carries the new span, so publishes made while handling the delivery are
/// its children. The caller ends the span through `ctx.span()`.
pub fn consumer_context(props: &AMQPProperties, tracer: &BoxedTracer, queue: &str) -> Context {
    let mut headers = props
        .headers()
        .clone()
        .unwrap_or_default()
        .inner()
        .clone();

    let parent = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&RabbitMQTracePropagator::new(&mut headers))
    });

    let span = tracer
        .span_builder(Cow::from(queue.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &parent);

    parent.with_span(span)
}

/// Injects the current trace context into outbound headers.
pub(crate) fn inject_context(ctx: &Context, headers: &mut BTreeMap<ShortString, AMQPValue>) {
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(headers))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injector_never_overwrites_application_headers() {
        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("user_uuid"),
            AMQPValue::LongString("11111111-1111-1111-1111-111111111111".into()),
        );

        let mut propagator = RabbitMQTracePropagator::new(&mut headers);
        propagator.set("USER_UUID", "overwritten".to_owned());
        propagator.set("traceparent", "00-abc-def-01".to_owned());

        assert_eq!(propagator.get("user_uuid"), Some("11111111-1111-1111-1111-111111111111"));
        assert_eq!(propagator.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(propagator.keys().len(), 2);
    }

    #[test]
    fn consumer_context_carries_a_span() {
        let tracer = opentelemetry::global::tracer("test");
        let ctx = consumer_context(&AMQPProperties::default(), &tracer, "resize_queue");
        assert!(ctx.has_active_span());
    }
}
