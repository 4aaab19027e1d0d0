// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use anyhow::Context as _;
use hotels_images::{
    bootstrap::{cancel_on_signal, dispatcher, init_telemetry, run_dispatcher},
    channel::new_amqp_connection,
    configs::Configs,
    hotels::{handlers::worker_definition, repository::PgHotelRepository},
    metrics, persistence,
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("info");

    let cfg = Configs::load().context("loading configuration")?;
    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    let conn = new_amqp_connection(&cfg).await?;
    let pool = persistence::connect(&cfg.postgres).await.context("connecting to postgres")?;

    let defs = vec![worker_definition(Arc::new(PgHotelRepository::new(pool)))];
    let dispatcher = dispatcher(conn, &cfg, defs).await?;

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], cfg.metrics.port));
    let metrics_token = token.clone();
    let metrics_server = tokio::spawn(async move {
        if let Err(err) = metrics::serve(metrics_addr, metrics_token.clone()).await {
            error!(error = err.to_string(), "metrics server failed");
            metrics_token.cancel();
        }
    });

    info!(app = %cfg.app.name, "hotel image worker started");
    let result = run_dispatcher(&dispatcher, token.clone()).await;

    token.cancel();
    let _ = metrics_server.await;
    info!("hotel image worker stopped");

    result
}
