// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messaging Abstractions
//!
//! Broker-agnostic contracts shared by the RabbitMQ implementation and the
//! services built on top of it: the handler invoked per delivery, the message it
//! receives, and the publisher used to emit follow-up events.

pub mod errors;
pub mod handler;
pub mod publisher;
