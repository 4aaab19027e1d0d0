// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! JSON payloads exchanged between the image, user and hotel services.
//!
//! Raw-bytes work messages carry no schema: the body is the image and the
//! owning entity travels in a correlation header.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation header naming the user that owns an avatar.
pub const USER_UUID_HEADER: &str = "user_uuid";
/// Correlation header naming the hotel that owns an image.
pub const HOTEL_UUID_HEADER: &str = "hotel_uuid";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An uploaded avatar, first announced by the resize path and then
/// re-announced with the persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadImageMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<Uuid>,
    pub user_id: Uuid,
    pub image_url: String,
    pub is_uploaded: bool,
}

/// A processed hotel image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHotelImageMsg {
    pub hotel_id: Uuid,
    pub image: String,
}
