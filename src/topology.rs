// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module makes the exchanges, queues and bindings the pipeline needs exist
//! before any worker starts consuming.
//!
//! The main components are:
//! - `Declaration`: one exchange, one queue and the binding between them
//! - `Topology` trait: interface for declaring a `Declaration`
//! - `AmqpTopology`: implementation of the Topology trait for RabbitMQ
//!
//! Declarations are idempotent on the broker: re-declaring an object with the
//! same parameters is a no-op, while differing parameters are rejected by the
//! broker with `PRECONDITION_FAILED` and surface as a topology error.

use crate::{
    channel::open_channel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{BasicQosOptions, QueueBindOptions},
    types::FieldTable,
    Channel, Connection,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Default prefetch count for every consuming channel.
pub const DEFAULT_PREFETCH: u16 = 1;

/// One exchange, one queue and the binding that joins them.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub exchange: ExchangeDefinition,
    pub queue: QueueDefinition,
    pub binding: QueueBinding,
}

impl Declaration {
    /// Describes a durable direct exchange bound to a durable queue with
    /// `binding_key`.
    pub fn direct(exchange: &str, queue: &str, binding_key: &str) -> Declaration {
        Declaration {
            exchange: ExchangeDefinition::new(exchange).direct().durable(),
            queue: QueueDefinition::new(queue).durable(),
            binding: QueueBinding::new(queue)
                .exchange(exchange)
                .routing_key(binding_key),
        }
    }
}

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology: Send + Sync {
    /// Declares the exchange, the queue and their binding, and returns a channel
    /// configured with the prefetch limit.
    async fn declare(&self, def: &Declaration) -> Result<Channel, AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
///
/// Every declaration opens its own channel on the shared connection; the
/// returned channel is owned by the caller, which closes it at shutdown.
pub struct AmqpTopology {
    conn: Arc<Connection>,
    prefetch: u16,
}

impl AmqpTopology {
    /// Creates a new AmqpTopology instance.
    ///
    /// # Parameters
    /// * `conn` - The shared connection to the RabbitMQ server
    /// * `prefetch` - Prefetch count applied to every returned channel
    pub fn new(conn: Arc<Connection>, prefetch: u16) -> AmqpTopology {
        AmqpTopology { conn, prefetch }
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    /// Declares one exchange/queue/binding triple.
    ///
    /// This method performs the following operations in order:
    /// 1. Declares the exchange
    /// 2. Declares the queue
    /// 3. Binds the queue to the exchange
    /// 4. Sets the prefetch (count, size=0, global=false) on the channel
    ///
    /// # Returns
    /// The configured channel on success or AmqpError on failure
    async fn declare(&self, def: &Declaration) -> Result<Channel, AmqpError> {
        let channel = open_channel(&self.conn).await?;

        install_exchange(&channel, &def.exchange).await?;
        install_queue(&channel, &def.queue).await?;
        binding_queue(&channel, &def.binding).await?;
        set_prefetch(&channel, &def.queue.name, self.prefetch).await?;

        Ok(channel)
    }
}

/// Declares an exchange on the given channel.
pub(crate) async fn install_exchange(
    channel: &Channel,
    exch: &ExchangeDefinition,
) -> Result<(), AmqpError> {
    debug!("creating exchange: {}", exch.name);

    match channel
        .exchange_declare(
            &exch.name,
            exch.kind.into(),
            exch.options(),
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = exch.name,
                "error to declare the exchange"
            );
            Err(AmqpError::DeclareExchangeError(exch.name.clone()))
        }
        _ => {
            debug!("exchange: {} was created", exch.name);
            Ok(())
        }
    }
}

/// Declares a queue on the given channel.
pub(crate) async fn install_queue(
    channel: &Channel,
    def: &QueueDefinition,
) -> Result<(), AmqpError> {
    debug!("creating queue: {}", def.name);

    match channel
        .queue_declare(&def.name, def.options(), FieldTable::default())
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = def.name,
                "error to declare the queue"
            );
            Err(AmqpError::DeclareQueueError(def.name.clone()))
        }
        _ => {
            debug!("queue: {} was created", def.name);
            Ok(())
        }
    }
}

/// Binds a queue to an exchange on the given channel.
pub(crate) async fn binding_queue(
    channel: &Channel,
    binding: &QueueBinding,
) -> Result<(), AmqpError> {
    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        binding.queue_name, binding.exchange_name, binding.routing_key
    );

    match channel
        .queue_bind(
            &binding.queue_name,
            &binding.exchange_name,
            &binding.routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to bind queue to exchange");

            Err(AmqpError::BindingExchangeToQueueError(
                binding.exchange_name.clone(),
                binding.queue_name.clone(),
            ))
        }
        _ => {
            debug!("queue was bounded");
            Ok(())
        }
    }
}

/// Caps the number of unacked deliveries in flight on the channel.
pub(crate) async fn set_prefetch(
    channel: &Channel,
    queue: &str,
    prefetch: u16,
) -> Result<(), AmqpError> {
    match channel
        .basic_qos(prefetch, BasicQosOptions { global: false })
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), queue, "error to configure qos");
            Err(AmqpError::QoSDeclarationError(queue.to_owned()))
        }
        _ => Ok(()),
    }
}
