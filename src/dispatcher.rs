// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! This module multiplexes several (queue, worker pool, handler) definitions onto
//! the shared connection.
//!
//! Lifecycle:
//! 1. `initialize`: declares the topology of every registered definition and
//!    retains the returned channels.
//! 2. `consume_blocking`: spawns one consume loop per definition. Each loop opens
//!    a fresh channel with the prefetch limit, starts a consumption stream with
//!    manual acks and spawns `pool_size` workers draining it. When the stream
//!    ends (channel closed) or the root token is cancelled the loop waits for its
//!    workers, closes its channel and cancels the root token so sibling loops
//!    terminate too.
//! 3. `close_channels`: best-effort close of the retained channels.
//!
//! Workers finish and settle the message they hold before observing
//! cancellation, so no delivery handed to a handler is left unacked.

use crate::{
    channel::{close_channel, open_channel},
    consumer::{consume, consumer_message, DeliveryAcker, Settlement},
    errors::AmqpError,
    messaging::{
        errors::MessagingError,
        handler::{ConsumerHandler, ConsumerMessage},
    },
    metrics::ConsumerMetrics,
    otel,
    topology::{set_prefetch, Declaration, Topology, DEFAULT_PREFETCH},
};
use futures_util::{future::join_all, Stream, StreamExt};
use lapin::{
    acker::Acker, message::Delivery, options::BasicConsumeOptions, types::FieldTable, Channel,
    Connection,
};
use opentelemetry::{
    global,
    trace::{Status, TraceContextExt},
    Context,
};
use parking_lot::Mutex;
use std::{borrow::Cow, sync::Arc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A queue together with the handler and worker pool draining it.
#[derive(Clone)]
pub struct WorkerDefinition {
    pub declaration: Declaration,
    pub consumer_tag: String,
    pub pool_size: usize,
    pub handler: Arc<dyn ConsumerHandler>,
}

impl WorkerDefinition {
    pub fn new(
        declaration: Declaration,
        consumer_tag: &str,
        pool_size: usize,
        handler: Arc<dyn ConsumerHandler>,
    ) -> WorkerDefinition {
        WorkerDefinition {
            declaration,
            consumer_tag: consumer_tag.to_owned(),
            pool_size,
            handler,
        }
    }

    pub fn queue(&self) -> &str {
        self.declaration.queue.name()
    }
}

/// One delivery ready for a worker. `ctx` carries the delivery's consumer span.
pub(crate) struct Inbound<A> {
    pub ctx: Context,
    pub msg: ConsumerMessage,
    pub acker: A,
}

fn inbound(queue: &str, delivery: Delivery) -> Inbound<Acker> {
    let tracer = global::tracer("amqp consumer");
    let ctx = otel::consumer_context(&delivery.properties, &tracer, queue);
    let msg = consumer_message(queue, &delivery);

    Inbound {
        ctx,
        msg,
        acker: delivery.acker,
    }
}

/// RabbitMQ consumer framework.
pub struct RabbitMQDispatcher {
    conn: Arc<Connection>,
    topology: Arc<dyn Topology>,
    prefetch: u16,
    metrics: ConsumerMetrics,
    pub(crate) definitions: Vec<WorkerDefinition>,
    channels: Mutex<Vec<Channel>>,
}

impl RabbitMQDispatcher {
    /// Creates a new RabbitMQ dispatcher.
    ///
    /// # Parameters
    /// * `conn` - The shared connection
    /// * `topology` - Declares the topology of every registered definition
    pub fn new(conn: Arc<Connection>, topology: Arc<dyn Topology>) -> Self {
        RabbitMQDispatcher {
            conn,
            topology,
            prefetch: DEFAULT_PREFETCH,
            metrics: ConsumerMetrics::global(),
            definitions: vec![],
            channels: Mutex::new(vec![]),
        }
    }

    /// Overrides the prefetch count of the consuming channels.
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Registers a queue, its worker pool and its handler.
    pub fn register(mut self, def: WorkerDefinition) -> Self {
        self.definitions.push(def);
        self
    }

    pub fn definitions(&self) -> &[WorkerDefinition] {
        &self.definitions
    }

    /// Declares the topology of every registered definition.
    ///
    /// Fails on the first broker rejection; the caller aborts startup.
    pub async fn initialize(&self) -> Result<(), AmqpError> {
        for def in &self.definitions {
            let channel = self.topology.declare(&def.declaration).await?;
            self.channels.lock().push(channel);
            info!(
                queue = def.queue(),
                exchange = def.declaration.exchange.name(),
                "queue declared"
            );
        }

        Ok(())
    }

    /// Runs every registered consume loop until the token is cancelled or a
    /// channel closes.
    ///
    /// # Returns
    /// Ok(()) after a clean drain, or MessagingError when a loop failed to start
    pub async fn consume_blocking(&self, token: CancellationToken) -> Result<(), MessagingError> {
        let mut spawns = vec![];

        for def in self.definitions.clone() {
            spawns.push(tokio::spawn(consume_loop(
                self.conn.clone(),
                def,
                self.prefetch,
                self.metrics.clone(),
                token.clone(),
            )));
        }

        let mut result = Ok(());
        for res in join_all(spawns).await {
            match res {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(error = err.to_string(), "consume loop failed");
                    token.cancel();
                    result = Err(MessagingError::CreatingConsumerError);
                }
                Err(err) => {
                    error!(error = err.to_string(), "tokio process error");
                    token.cancel();
                    result = Err(MessagingError::InternalError);
                }
            }
        }

        result
    }

    /// Best-effort close of the channels retained by `initialize`.
    pub async fn close_channels(&self) {
        let channels: Vec<Channel> = self.channels.lock().drain(..).collect();

        for channel in channels {
            if let Err(err) = close_channel(&channel).await {
                error!(error = err.to_string(), "failure to close channel");
            }
        }
    }
}

async fn consume_loop(
    conn: Arc<Connection>,
    def: WorkerDefinition,
    prefetch: u16,
    metrics: ConsumerMetrics,
    token: CancellationToken,
) -> Result<(), AmqpError> {
    let queue = def.queue().to_owned();

    let channel = open_channel(&conn).await?;
    set_prefetch(&channel, &queue, prefetch).await?;

    let on_error_token = token.clone();
    let on_error_queue = queue.clone();
    channel.on_error(move |err| {
        error!(
            error = err.to_string(),
            queue = on_error_queue,
            "consume channel closed"
        );
        on_error_token.cancel();
    });

    let consumer = match channel
        .basic_consume(
            &queue,
            &def.consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to create the consumer");
            return Err(AmqpError::BindingConsumerError(def.consumer_tag.clone()));
        }
        Ok(c) => c,
    };

    info!(
        queue,
        consumer_tag = def.consumer_tag,
        workers = def.pool_size,
        "consumer started"
    );

    let mut workers = JoinSet::new();
    for worker in 0..def.pool_size {
        let stream_queue = queue.clone();
        let deliveries = consumer.clone().map(move |res| match res {
            Ok(delivery) => Ok(inbound(&stream_queue, delivery)),
            Err(err) => Err(AmqpError::ConsumerError(err.to_string())),
        });

        workers.spawn(run_worker(
            worker,
            queue.clone(),
            deliveries,
            def.handler.clone(),
            metrics.clone(),
            token.clone(),
        ));
    }

    while let Some(res) = workers.join_next().await {
        if let Err(err) = res {
            error!(error = err.to_string(), queue, "worker task failed");
        }
    }

    if let Err(err) = close_channel(&channel).await {
        error!(error = err.to_string(), queue, "failure to close consume channel");
    }

    debug!(queue, "consume loop finished");
    token.cancel();

    Ok(())
}

/// Drains deliveries until the stream ends or the token is cancelled.
///
/// Cancellation is only observed between messages.
pub(crate) async fn run_worker<S, A>(
    worker: usize,
    queue: String,
    mut deliveries: S,
    handler: Arc<dyn ConsumerHandler>,
    metrics: ConsumerMetrics,
    token: CancellationToken,
) where
    S: Stream<Item = Result<Inbound<A>, AmqpError>> + Unpin,
    A: DeliveryAcker,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(queue, worker, "worker cancelled");
                break;
            }
            next = deliveries.next() => next,
        };

        let inbound = match next {
            None => {
                debug!(queue, worker, "delivery stream closed");
                break;
            }
            Some(Err(err)) => {
                error!(error = err.to_string(), queue, worker, "errors consume msg");
                break;
            }
            Some(Ok(inbound)) => inbound,
        };

        let settled = consume(
            &inbound.ctx,
            handler.as_ref(),
            &inbound.msg,
            &inbound.acker,
            &metrics,
        )
        .await;

        let span = inbound.ctx.span();
        match settled {
            Ok(Settlement::Acked) => span.set_status(Status::Ok),
            Ok(Settlement::Rejected) => span.set_status(Status::Error {
                description: Cow::from("message rejected"),
            }),
            Err(err) => {
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("error to settle msg"),
                });
            }
        }
        span.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::MockDeliveryAcker;
    use async_trait::async_trait;
    use futures_util::stream;
    use opentelemetry::trace::Tracer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConsumerHandler for CountingHandler {
        async fn exec(&self, _: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if msg.header("user_uuid").is_none() {
                return Err(MessagingError::PermanentHandlerError(
                    "missing user_uuid".to_owned(),
                ));
            }
            Ok(())
        }
    }

    fn delivery(
        with_header: bool,
        acks: usize,
        rejects: usize,
    ) -> Result<Inbound<MockDeliveryAcker>, AmqpError> {
        let mut acker = MockDeliveryAcker::new();
        acker.expect_ack().times(acks).returning(|| Ok(()));
        acker
            .expect_reject()
            .withf(|requeue| !*requeue)
            .times(rejects)
            .returning(|_| Ok(()));

        let mut msg = ConsumerMessage::new("resize_queue", b"img".to_vec());
        if with_header {
            msg = msg.with_header("user_uuid", "11111111-1111-1111-1111-111111111111");
        }

        let span = global::tracer("test").start("resize_queue");

        Ok(Inbound {
            ctx: Context::new().with_span(span),
            msg,
            acker,
        })
    }

    #[tokio::test]
    async fn worker_settles_every_delivery_then_stops_on_stream_end() {
        let handler = Arc::new(CountingHandler::default());
        let metrics = ConsumerMetrics::unregistered();
        let deliveries = stream::iter(vec![
            delivery(true, 1, 0),
            delivery(false, 0, 1),
            delivery(true, 1, 0),
        ]);

        run_worker(
            0,
            "resize_queue".to_owned(),
            deliveries,
            handler.clone(),
            metrics.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.incoming.get(), 3);
        assert_eq!(metrics.success.get(), 2);
        assert_eq!(metrics.error.get(), 1);
    }

    #[tokio::test]
    async fn worker_exits_when_cancelled() {
        let handler = Arc::new(CountingHandler::default());
        let token = CancellationToken::new();
        token.cancel();

        let deliveries = stream::pending::<Result<Inbound<MockDeliveryAcker>, AmqpError>>();

        run_worker(
            0,
            "resize_queue".to_owned(),
            deliveries,
            handler.clone(),
            ConsumerMetrics::unregistered(),
            token,
        )
        .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    struct CancellingHandler {
        token: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConsumerHandler for CancellingHandler {
        async fn exec(&self, _: &Context, _: &ConsumerMessage) -> Result<(), MessagingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn in_flight_message_is_settled_after_cancel() {
        let token = CancellationToken::new();
        let handler = Arc::new(CancellingHandler {
            token: token.clone(),
            calls: AtomicUsize::new(0),
        });
        let metrics = ConsumerMetrics::unregistered();
        let deliveries = stream::iter(vec![delivery(true, 1, 0), delivery(true, 0, 0)]);

        run_worker(
            0,
            "resize_queue".to_owned(),
            deliveries,
            handler.clone(),
            metrics.clone(),
            token.clone(),
        )
        .await;

        assert!(token.is_cancelled());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.success.get(), 1);
    }

    #[tokio::test]
    async fn worker_stops_on_stream_error() {
        let handler = Arc::new(CountingHandler::default());
        let deliveries = stream::iter(vec![
            Err(AmqpError::ConsumerError("channel closed".to_owned())),
            delivery(true, 0, 0),
        ]);

        run_worker(
            0,
            "resize_queue".to_owned(),
            deliveries,
            handler.clone(),
            ConsumerMetrics::unregistered(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pool_of_workers_shares_one_stream() {
        let handler = Arc::new(CountingHandler::default());
        let metrics = ConsumerMetrics::unregistered();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let shared = Arc::new(tokio::sync::Mutex::new(rx));

        for _ in 0..20 {
            assert!(tx.send(delivery(true, 1, 0)).is_ok());
        }
        drop(tx);

        let mut workers = JoinSet::new();
        for worker in 0..4 {
            let shared = shared.clone();
            let deliveries = Box::pin(stream::unfold(shared, |rx| async move {
                let next = rx.lock().await.recv().await;
                next.map(|item| (item, rx))
            }));
            workers.spawn(run_worker(
                worker,
                "resize_queue".to_owned(),
                deliveries,
                handler.clone(),
                metrics.clone(),
                CancellationToken::new(),
            ));
        }

        while workers.join_next().await.is_some() {}

        assert_eq!(handler.calls.load(Ordering::SeqCst), 20);
        assert_eq!(metrics.success.get(), 20);
    }

    #[test]
    fn definition_exposes_queue_name() {
        let def = WorkerDefinition::new(
            Declaration::direct("images", "create_queue", "create_image_key"),
            "create_consumer",
            5,
            Arc::new(CountingHandler::default()),
        );
        assert_eq!(def.queue(), "create_queue");
        assert_eq!(def.pool_size, 5);
    }
}
