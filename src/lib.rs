// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Hotel Images
//!
//! Image processing pipeline of the hotel platform: an AMQP consumer framework
//! with declarative topology, a confirming publisher, the image transform
//! engine, S3 and Postgres adapters, the image service use-case with its RPC
//! read path, and the user and hotel consumers that close the flow.

mod consumer;
mod otel;

pub mod bootstrap;
pub mod channel;
pub mod configs;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod hotels;
pub mod images;
pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod publisher;
pub mod queue;
pub mod topology;
pub mod users;
