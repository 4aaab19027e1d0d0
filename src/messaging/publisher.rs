// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::messaging::errors::MessagingError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use opentelemetry::Context;
use std::collections::HashMap;

/// A message to publish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishMessage {
    /// Exchange name.
    pub to: String,
    /// Routing key.
    pub key: String,
    pub content_type: Option<String>,
    /// Passed through verbatim.
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
}

impl PublishMessage {
    pub fn new(to: &str, key: &str, data: Vec<u8>) -> PublishMessage {
        PublishMessage {
            to: to.to_owned(),
            key: key.to_owned(),
            data,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, ctx: &Context, msg: &PublishMessage) -> Result<(), MessagingError>;
}
