// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! User-side terminal consumer of the avatar flow.

pub mod handlers;
pub mod repository;
