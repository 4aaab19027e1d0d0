// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Bootstrap
//!
//! Startup and shutdown plumbing shared by the service binaries: log and trace
//! propagation setup, the signal handler that cancels the root token, and the
//! consume lifecycle of a dispatcher.

use crate::{
    configs::Configs,
    dispatcher::{RabbitMQDispatcher, WorkerDefinition},
    topology::AmqpTopology,
};
use lapin::Connection;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber and the W3C trace-context propagator.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_telemetry(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    global::set_text_map_propagator(TraceContextPropagator::new());
}

/// Cancels `token` on SIGINT or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, shutting down"),
                        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                        _ = token.cancelled() => return,
                    }
                }
                Err(err) => {
                    error!(error = err.to_string(), "failure to install SIGTERM handler");
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, shutting down"),
                        _ = token.cancelled() => return,
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = ctrl_c => info!("received Ctrl+C, shutting down"),
                _ = token.cancelled() => return,
            }
        }

        token.cancel();
    });
}

/// Builds a dispatcher for `defs` and declares their topology.
pub async fn dispatcher(
    conn: Arc<Connection>,
    cfg: &Configs,
    defs: Vec<WorkerDefinition>,
) -> anyhow::Result<RabbitMQDispatcher> {
    let prefetch = cfg.rabbitmq.prefetch;
    let topology = Arc::new(AmqpTopology::new(conn.clone(), prefetch));

    let dispatcher = defs
        .into_iter()
        .fold(RabbitMQDispatcher::new(conn, topology).prefetch(prefetch), |d, def| d.register(def));

    dispatcher.initialize().await?;
    Ok(dispatcher)
}

/// Consumes until the token is cancelled or a channel closes, then releases the
/// declaration channels.
pub async fn run_dispatcher(
    dispatcher: &RabbitMQDispatcher,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let result = dispatcher.consume_blocking(token).await;
    dispatcher.close_channels().await;

    result?;
    info!("consumers drained");
    Ok(())
}
