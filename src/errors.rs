// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Broker Layer
//!
//! This module provides the error type for every RabbitMQ operation performed by
//! the image pipeline. The `AmqpError` enum covers connection and channel setup,
//! topology declaration, consumption and the ack/reject discipline.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// The declaration variants (`DeclareExchangeError`, `DeclareQueueError`,
/// `BindingExchangeToQueueError`, `QoSDeclarationError`) form the topology
/// error family: any of them aborts service startup.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error closing a channel
    #[error("failure to close channel `{0}`")]
    CloseChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}

impl AmqpError {
    /// Returns true when the error was raised while declaring the topology.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            AmqpError::DeclareExchangeError(_)
                | AmqpError::DeclareQueueError(_)
                | AmqpError::BindingExchangeToQueueError(_, _)
                | AmqpError::QoSDeclarationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_family_is_classified() {
        assert!(AmqpError::DeclareExchangeError("images".to_owned()).is_topology_error());
        assert!(AmqpError::QoSDeclarationError("resize_queue".to_owned()).is_topology_error());
        assert!(!AmqpError::AckMessageError.is_topology_error());
        assert!(!AmqpError::ConnectionError.is_topology_error());
    }

    #[test]
    fn binding_error_names_both_sides() {
        let err = AmqpError::BindingExchangeToQueueError(
            "images".to_owned(),
            "resize_queue".to_owned(),
        );
        assert_eq!(
            err.to_string(),
            "failure to binding exchange `images` to queue `resize_queue`"
        );
    }
}
