// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use thiserror::Error;

/// Errors raised by publishers and consumer handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("internal error")]
    InternalError,

    #[error("failure to publish: {0}")]
    PublisherError(String),

    #[error("publish timed out")]
    PublishTimeout,

    #[error("publish was not confirmed by the broker")]
    PublishNotConfirmed,

    #[error("failure to create the consumer")]
    CreatingConsumerError,

    /// The message can never be processed; retrying it is pointless.
    #[error("permanent failure handling message: {0}")]
    PermanentHandlerError(String),

    #[error("failure handling message: {0}")]
    HandlerError(String),
}

impl MessagingError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, MessagingError::PermanentHandlerError(_))
    }
}
