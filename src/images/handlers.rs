// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Queue handlers of the image service.

use crate::{
    dispatcher::WorkerDefinition,
    exchange::IMAGES_EXCHANGE,
    images::usecase::ImageUseCase,
    messaging::{
        errors::MessagingError,
        handler::{ConsumerHandler, ConsumerMessage},
    },
    queue::{
        CREATE_BINDING_KEY, CREATE_CONSUMER_TAG, CREATE_QUEUE, CREATE_WORKERS, RESIZE_BINDING_KEY,
        RESIZE_CONSUMER_TAG, RESIZE_QUEUE, RESIZE_WORKERS, UPLOAD_HOTEL_IMAGE_BINDING_KEY,
        UPLOAD_HOTEL_IMAGE_CONSUMER_TAG, UPLOAD_HOTEL_IMAGE_QUEUE, UPLOAD_HOTEL_IMAGE_WORKERS,
    },
    topology::Declaration,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Arc;

pub struct CreateImageHandler {
    usecase: Arc<ImageUseCase>,
}

impl CreateImageHandler {
    pub fn new(usecase: Arc<ImageUseCase>) -> Arc<CreateImageHandler> {
        Arc::new(CreateImageHandler { usecase })
    }
}

#[async_trait]
impl ConsumerHandler for CreateImageHandler {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
        self.usecase.create_image(ctx, msg).await?;
        Ok(())
    }
}

pub struct ResizeImageHandler {
    usecase: Arc<ImageUseCase>,
}

impl ResizeImageHandler {
    pub fn new(usecase: Arc<ImageUseCase>) -> Arc<ResizeImageHandler> {
        Arc::new(ResizeImageHandler { usecase })
    }
}

#[async_trait]
impl ConsumerHandler for ResizeImageHandler {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
        self.usecase.resize_image(ctx, msg).await?;
        Ok(())
    }
}

pub struct ProcessHotelImageHandler {
    usecase: Arc<ImageUseCase>,
}

impl ProcessHotelImageHandler {
    pub fn new(usecase: Arc<ImageUseCase>) -> Arc<ProcessHotelImageHandler> {
        Arc::new(ProcessHotelImageHandler { usecase })
    }
}

#[async_trait]
impl ConsumerHandler for ProcessHotelImageHandler {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
        self.usecase.process_hotel_image(ctx, msg).await?;
        Ok(())
    }
}

/// Queues consumed by the image service.
///
/// The hotel upload queue is only consumed when `hotel_enabled` is set.
pub fn worker_definitions(
    usecase: Arc<ImageUseCase>,
    hotel_enabled: bool,
) -> Vec<WorkerDefinition> {
    let mut defs = vec![
        WorkerDefinition::new(
            Declaration::direct(IMAGES_EXCHANGE, RESIZE_QUEUE, RESIZE_BINDING_KEY),
            RESIZE_CONSUMER_TAG,
            RESIZE_WORKERS,
            ResizeImageHandler::new(usecase.clone()),
        ),
        WorkerDefinition::new(
            Declaration::direct(IMAGES_EXCHANGE, CREATE_QUEUE, CREATE_BINDING_KEY),
            CREATE_CONSUMER_TAG,
            CREATE_WORKERS,
            CreateImageHandler::new(usecase.clone()),
        ),
    ];

    if hotel_enabled {
        defs.push(WorkerDefinition::new(
            Declaration::direct(
                IMAGES_EXCHANGE,
                UPLOAD_HOTEL_IMAGE_QUEUE,
                UPLOAD_HOTEL_IMAGE_BINDING_KEY,
            ),
            UPLOAD_HOTEL_IMAGE_CONSUMER_TAG,
            UPLOAD_HOTEL_IMAGE_WORKERS,
            ProcessHotelImageHandler::new(usecase),
        ));
    }

    defs
}
