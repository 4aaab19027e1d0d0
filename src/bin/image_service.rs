// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use anyhow::Context as _;
use hotels_images::{
    bootstrap::{cancel_on_signal, dispatcher, init_telemetry, run_dispatcher},
    channel::new_amqp_connection,
    configs::Configs,
    images::{
        grpc,
        handlers::worker_definitions,
        repository::PgImageRepository,
        storage::S3ObjectStore,
        transform::TransformEngine,
        usecase::ImageUseCase,
    },
    messaging::publisher::Publisher,
    metrics, persistence,
    publisher::RabbitMQPublisher,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
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
    let store = S3ObjectStore::new(S3ObjectStore::client(&cfg.s3).await, &cfg.s3);

    let publisher: Arc<dyn Publisher> = match cfg.consumers.publish_timeout_ms {
        Some(ms) => RabbitMQPublisher::with_timeout(conn.clone(), Duration::from_millis(ms)),
        None => RabbitMQPublisher::new(conn.clone()),
    };

    let usecase = Arc::new(ImageUseCase::new(
        publisher,
        Arc::new(store),
        Arc::new(PgImageRepository::new(pool)),
        Arc::new(TransformEngine::default()),
    ));

    let defs = worker_definitions(usecase.clone(), cfg.consumers.hotel_images_enabled);
    let dispatcher = dispatcher(conn, &cfg, defs).await?;

    let grpc_addr: SocketAddr = format!("{}:{}", cfg.grpc.host, cfg.grpc.port)
        .parse()
        .context("parsing grpc address")?;
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], cfg.metrics.port));

    let grpc_token = token.clone();
    let grpc_server = tokio::spawn(async move {
        if let Err(err) = grpc::serve(grpc_addr, usecase, grpc_token.clone()).await {
            error!(error = err.to_string(), "grpc server failed");
            grpc_token.cancel();
        }
    });

    let metrics_token = token.clone();
    let metrics_server = tokio::spawn(async move {
        if let Err(err) = metrics::serve(metrics_addr, metrics_token.clone()).await {
            error!(error = err.to_string(), "metrics server failed");
            metrics_token.cancel();
        }
    });

    info!(app = %cfg.app.name, "image service started");
    let result = run_dispatcher(&dispatcher, token.clone()).await;

    token.cancel();
    let _ = tokio::join!(grpc_server, metrics_server);
    info!("image service stopped");

    result
}
