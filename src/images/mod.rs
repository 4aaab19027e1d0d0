// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Image Service
//!
//! Consumes raw uploads and upload records from the `images` exchange, runs the
//! transform engine, stores results in the object store, persists records and
//! publishes follow-up events. Also serves the `GetImageByID` read path.

pub mod grpc;
pub mod handlers;
pub mod models;
pub mod pool;
pub mod repository;
pub mod storage;
pub mod transform;
pub mod usecase;
