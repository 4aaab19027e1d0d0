// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module handles the creation of the single long-lived AMQP connection each
//! service process owns, and of the channels opened on top of it. Channels are
//! not shared between tasks: the publisher opens one per publish and every
//! consume loop owns its own.

use crate::{configs::Configs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates the process-wide AMQP connection.
///
/// The connection is named after the application so it can be identified in the
/// broker management UI.
///
/// # Parameters
/// * `cfg` - Configuration containing RabbitMQ connection details
///
/// # Returns
/// * `Result<Arc<Connection>, AmqpError>` - The shared connection, or
///   `AmqpError::ConnectionError` when the broker cannot be reached.
pub async fn new_amqp_connection(cfg: &Configs) -> Result<Arc<Connection>, AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    match Connection::connect(&cfg.rabbitmq.uri(), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(Arc::new(conn))
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }
}

/// Opens a new channel on an established connection.
///
/// # Parameters
/// * `conn` - The shared connection
///
/// # Returns
/// * `Result<Channel, AmqpError>` - The channel, or `AmqpError::ChannelError`
pub async fn open_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!(channel = c.id(), "channel created");
            Ok(c)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

/// Closes a channel with the normal reply code.
///
/// Closing an already closed channel is not an error.
pub async fn close_channel(channel: &Channel) -> Result<(), AmqpError> {
    if !channel.status().connected() {
        return Ok(());
    }

    match channel.close(200, "OK").await {
        Ok(_) => {
            debug!(channel = channel.id(), "channel closed");
            Ok(())
        }
        Err(err) => {
            error!(error = err.to_string(), "error to close the channel");
            Err(AmqpError::CloseChannelError(channel.id().to_string()))
        }
    }
}
