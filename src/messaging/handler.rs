// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::messaging::errors::MessagingError;
use async_trait::async_trait;
use bytes::Bytes;
use opentelemetry::Context;
use std::collections::HashMap;

/// A delivery as seen by a handler.
///
/// Headers are flattened to strings; the owning-entity correlation header
/// (`user_uuid` or `hotel_uuid`) is read from here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerMessage {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub data: Bytes,
    pub delivery_tag: u64,
}

impl ConsumerMessage {
    pub fn new(queue: &str, data: impl Into<Bytes>) -> ConsumerMessage {
        ConsumerMessage {
            queue: queue.to_owned(),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// Per-queue message handler.
///
/// Handlers never ack or reject: they return an error and the worker loop turns
/// it into a broker decision.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError>;
}
