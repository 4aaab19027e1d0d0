// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Hotel-side terminal consumer of the hotel image flow.

pub mod handlers;
pub mod repository;
