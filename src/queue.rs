// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides the builders describing queues and their bindings, and
//! the fixed names of every queue, binding key and consumer tag the platform
//! uses. Dead-letter routing is left to broker policies and is not declared here.

use lapin::options::QueueDeclareOptions;

pub const RESIZE_QUEUE: &str = "resize_queue";
pub const RESIZE_BINDING_KEY: &str = "resize_image_key";
pub const RESIZE_CONSUMER_TAG: &str = "resize_consumer";
pub const RESIZE_WORKERS: usize = 10;

pub const CREATE_QUEUE: &str = "create_queue";
pub const CREATE_BINDING_KEY: &str = "create_image_key";
pub const CREATE_CONSUMER_TAG: &str = "create_consumer";
pub const CREATE_WORKERS: usize = 5;

pub const UPLOAD_HOTEL_IMAGE_QUEUE: &str = "upload_hotel_image_queue";
pub const UPLOAD_HOTEL_IMAGE_BINDING_KEY: &str = "upload_hotel_image_binding_key";
pub const UPLOAD_HOTEL_IMAGE_CONSUMER_TAG: &str = "upload_hotel_image_consumer_tag";
pub const UPLOAD_HOTEL_IMAGE_WORKERS: usize = 10;

pub const AVATARS_QUEUE: &str = "avatars_queue";
pub const UPDATE_AVATAR_BINDING_KEY: &str = "update_avatar_key";
pub const AVATARS_CONSUMER_TAG: &str = "user_avatar_consumer";
pub const AVATARS_WORKERS: usize = 5;

pub const HOTEL_IMAGES_QUEUE: &str = "hotel_images_queue";
pub const HOTEL_IMAGES_CONSUMER_TAG: &str = "hotel_image_consumer";
pub const HOTEL_IMAGES_WORKERS: usize = 5;

/// Definition of a RabbitMQ queue with its configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is neither durable nor auto-deleted.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    pub(crate) fn options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.durable,
            auto_delete: self.delete,
            ..Default::default()
        }
    }
}

/// Configuration for binding a queue to an exchange.
///
/// Queue bindings define how messages flow from exchanges to queues based on
/// routing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new queue binding for the given queue.
    ///
    /// The exchange name and routing key start empty and are set with
    /// `exchange` and `routing_key`.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_queue_is_shared_and_kept() {
        let opts = QueueDefinition::new(RESIZE_QUEUE).durable().options();
        assert!(opts.durable);
        assert!(!opts.exclusive);
        assert!(!opts.auto_delete);
        assert!(!opts.passive);
    }

    #[test]
    fn binding_builder() {
        let binding = QueueBinding::new(CREATE_QUEUE)
            .exchange("images")
            .routing_key(CREATE_BINDING_KEY);

        assert_eq!(binding.queue_name(), "create_queue");
        assert_eq!(binding.exchange_name(), "images");
        assert_eq!(binding.key(), "create_image_key");
    }
}
