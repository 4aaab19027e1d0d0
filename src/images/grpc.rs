// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Read-only RPC facade over persisted image records.

use crate::{
    images::{models::Image, usecase::{ImageUseCase, UseCaseError}},
    persistence::RepositoryError,
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{debug, error, info};
use uuid::Uuid;

pub mod pb {
    tonic::include_proto!("images.v1");
}

use pb::image_service_server::{ImageService, ImageServiceServer};

impl From<Image> for pb::Image {
    fn from(image: Image) -> Self {
        pb::Image {
            image_id: image.image_id.to_string(),
            image_url: image.image_url,
            is_uploaded: image.is_uploaded,
            created_at: Some(prost_types::Timestamp {
                seconds: image.created_at.timestamp(),
                nanos: image.created_at.timestamp_subsec_nanos() as i32,
            }),
        }
    }
}

pub struct ImageGrpcService {
    usecase: Arc<ImageUseCase>,
}

impl ImageGrpcService {
    pub fn new(usecase: Arc<ImageUseCase>) -> ImageGrpcService {
        ImageGrpcService { usecase }
    }
}

#[tonic::async_trait]
impl ImageService for ImageGrpcService {
    async fn get_image_by_id(
        &self,
        request: Request<pb::GetImageByIdRequest>,
    ) -> Result<Response<pb::Image>, Status> {
        let raw = request.into_inner().image_id;
        let image_id = Uuid::parse_str(&raw)
            .map_err(|_| Status::invalid_argument(format!("invalid image id `{raw}`")))?;

        match self.usecase.get_image_by_id(image_id).await {
            Ok(image) => Ok(Response::new(image.into())),
            Err(UseCaseError::Repository(RepositoryError::NotFound)) => {
                debug!(%image_id, "image not found");
                Err(Status::not_found(format!("image {image_id} not found")))
            }
            Err(err) => {
                error!(error = err.to_string(), %image_id, "failure to load image");
                Err(Status::internal("failure to load image"))
            }
        }
    }
}

/// Serves the RPC facade until `token` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    usecase: Arc<ImageUseCase>,
    token: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    info!(%addr, "starting grpc server");

    Server::builder()
        .add_service(ImageServiceServer::new(ImageGrpcService::new(usecase)))
        .serve_with_shutdown(addr, token.cancelled_owned())
        .await
}
