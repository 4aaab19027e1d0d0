// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Metrics
//!
//! Process-wide Prometheus counters for message consumption and publishing.
//! They are registered once in the default registry; operators alert on
//! `error_messages`. `serve` exposes the registry in text format on `/metrics`.

use axum::{
    http::header::CONTENT_TYPE, http::StatusCode, response::IntoResponse, routing::get, Router,
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Opts, TextEncoder};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

static CONSUMER_METRICS: Lazy<ConsumerMetrics> = Lazy::new(|| {
    let metrics = ConsumerMetrics::unregistered();
    register(&[&metrics.incoming, &metrics.success, &metrics.error]);
    metrics
});

static PUBLISHER_METRICS: Lazy<PublisherMetrics> = Lazy::new(|| {
    let metrics = PublisherMetrics::unregistered();
    register(&[&metrics.published, &metrics.errors]);
    metrics
});

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help)).expect("valid metric opts for counter")
}

fn register(counters: &[&IntCounter]) {
    let registry = prometheus::default_registry();
    for c in counters {
        if let Err(e) = registry.register(Box::new((*c).clone())) {
            warn!("Failed to register broker metric: {}", e);
        }
    }
}

/// Counters incremented once per delivery outcome.
#[derive(Clone)]
pub struct ConsumerMetrics {
    pub incoming: IntCounter,
    pub success: IntCounter,
    pub error: IntCounter,
}

impl ConsumerMetrics {
    /// The process-wide instance.
    pub fn global() -> ConsumerMetrics {
        CONSUMER_METRICS.clone()
    }

    /// Counters not attached to any registry.
    pub fn unregistered() -> ConsumerMetrics {
        ConsumerMetrics {
            incoming: counter("incoming_messages", "Total number of deliveries received"),
            success: counter("success_messages", "Total number of deliveries acked"),
            error: counter("error_messages", "Total number of deliveries that failed"),
        }
    }
}

/// Counters incremented once per publish call.
#[derive(Clone)]
pub struct PublisherMetrics {
    pub published: IntCounter,
    pub errors: IntCounter,
}

impl PublisherMetrics {
    pub fn global() -> PublisherMetrics {
        PUBLISHER_METRICS.clone()
    }

    pub fn unregistered() -> PublisherMetrics {
        PublisherMetrics {
            published: counter("published_messages", "Total number of messages published"),
            errors: counter("publish_errors", "Total number of failed publishes"),
        }
    }
}

/// Renders the default registry in the Prometheus text format.
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;

    Ok((encoder.format_type().to_owned(), buffer))
}

async fn metrics_handler() -> impl IntoResponse {
    match render() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Serves `/metrics` until `token` is cancelled.
pub async fn serve(addr: SocketAddr, token: CancellationToken) -> std::io::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_instances_share_counters() {
        let a = ConsumerMetrics::global();
        let b = ConsumerMetrics::global();
        let before = b.error.get();
        a.error.inc();
        assert_eq!(b.error.get(), before + 1);
    }

    #[test]
    fn unregistered_instances_are_isolated() {
        let a = PublisherMetrics::unregistered();
        let b = PublisherMetrics::unregistered();
        a.published.inc();
        assert_eq!(a.published.get(), 1);
        assert_eq!(b.published.get(), 0);
    }

    #[test]
    fn registry_renders_broker_counters() {
        ConsumerMetrics::global().incoming.inc();
        PublisherMetrics::global().published.inc();

        let (content_type, body) = render().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("incoming_messages"));
        assert!(text.contains("published_messages"));
    }
}
