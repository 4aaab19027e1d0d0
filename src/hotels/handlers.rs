// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{
    dispatcher::WorkerDefinition,
    events::{UpdateHotelImageMsg, HOTEL_UUID_HEADER, USER_UUID_HEADER},
    exchange::USERS_EXCHANGE,
    hotels::repository::HotelRepository,
    messaging::{
        errors::MessagingError,
        handler::{ConsumerHandler, ConsumerMessage},
    },
    queue::{
        HOTEL_IMAGES_CONSUMER_TAG, HOTEL_IMAGES_QUEUE, HOTEL_IMAGES_WORKERS,
        UPDATE_AVATAR_BINDING_KEY,
    },
    topology::Declaration,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Stores the URL of a processed hotel image on the owning hotel.
///
/// Deliveries carrying only a `user_uuid` header belong to the avatar flow
/// sharing the same routing key; they are acked and skipped. Anything else
/// without a `hotel_uuid` header is rejected.
pub struct UpdateHotelImageHandler {
    repo: Arc<dyn HotelRepository>,
}

impl UpdateHotelImageHandler {
    pub fn new(repo: Arc<dyn HotelRepository>) -> Arc<UpdateHotelImageHandler> {
        Arc::new(UpdateHotelImageHandler { repo })
    }
}

#[async_trait]
impl ConsumerHandler for UpdateHotelImageHandler {
    async fn exec(&self, _ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
        let Some(raw) = msg.header(HOTEL_UUID_HEADER) else {
            if let Some(user) = msg.header(USER_UUID_HEADER) {
                debug!(user_uuid = %user, "skipping avatar update");
                return Ok(());
            }

            return Err(MessagingError::PermanentHandlerError(format!(
                "missing {HOTEL_UUID_HEADER} header"
            )));
        };
        let hotel_id = Uuid::parse_str(raw).map_err(|err| {
            MessagingError::PermanentHandlerError(format!("{HOTEL_UUID_HEADER}: {err}"))
        })?;

        let update: UpdateHotelImageMsg = serde_json::from_slice(&msg.data)
            .map_err(|err| MessagingError::PermanentHandlerError(err.to_string()))?;
        if update.hotel_id != hotel_id {
            return Err(MessagingError::PermanentHandlerError(format!(
                "{HOTEL_UUID_HEADER} {hotel_id} does not match hotel {}",
                update.hotel_id
            )));
        }

        self.repo.update_image(hotel_id, &update.image).await?;
        debug!(%hotel_id, image = %update.image, "hotel image updated");

        Ok(())
    }
}

pub fn worker_definition(repo: Arc<dyn HotelRepository>) -> WorkerDefinition {
    WorkerDefinition::new(
        Declaration::direct(USERS_EXCHANGE, HOTEL_IMAGES_QUEUE, UPDATE_AVATAR_BINDING_KEY),
        HOTEL_IMAGES_CONSUMER_TAG,
        HOTEL_IMAGES_WORKERS,
        UpdateHotelImageHandler::new(repo),
    )
}
