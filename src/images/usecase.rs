// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Image Use-Case
//!
//! The work behind the image service's three queues and its read path. Every
//! handler follows the same shape: read the correlation header, do the work,
//! publish a follow-up event carrying the same header.

use crate::{
    events::{UpdateHotelImageMsg, UploadImageMsg, HOTEL_UUID_HEADER, USER_UUID_HEADER},
    exchange::{IMAGES_EXCHANGE, USERS_EXCHANGE},
    images::{
        models::{Image, NewImage},
        repository::ImageRepository,
        storage::{ObjectStore, StorageError},
        transform::{TransformEngine, TransformError},
    },
    messaging::{
        errors::MessagingError,
        handler::ConsumerMessage,
        publisher::{PublishMessage, Publisher},
    },
    persistence::RepositoryError,
    queue::{CREATE_BINDING_KEY, UPDATE_AVATAR_BINDING_KEY},
};
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UseCaseError {
    #[error("invalid header `{0}`: {1}")]
    InvalidHeader(&'static str, String),

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl UseCaseError {
    /// Whether redelivering the same message could ever succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            UseCaseError::InvalidHeader(..) | UseCaseError::Payload(_) => true,
            UseCaseError::Transform(err) => matches!(
                err,
                TransformError::Decode(_)
                    | TransformError::UnsupportedFormat(_)
                    | TransformError::TooLarge { .. }
            ),
            UseCaseError::Repository(err) => matches!(err, RepositoryError::NotFound),
            UseCaseError::Messaging(err) => err.is_permanent(),
            UseCaseError::Storage(_) => false,
        }
    }
}

impl From<UseCaseError> for MessagingError {
    fn from(err: UseCaseError) -> Self {
        if err.is_permanent() {
            MessagingError::PermanentHandlerError(err.to_string())
        } else {
            MessagingError::HandlerError(err.to_string())
        }
    }
}

/// Reads a required UUID header, returning the parsed id and the raw value.
pub(crate) fn header_uuid<'a>(
    msg: &'a ConsumerMessage,
    header: &'static str,
) -> Result<(Uuid, &'a str), UseCaseError> {
    let raw = msg
        .header(header)
        .ok_or_else(|| UseCaseError::InvalidHeader(header, "missing".to_owned()))?;

    let id = Uuid::parse_str(raw)
        .map_err(|err| UseCaseError::InvalidHeader(header, err.to_string()))?;

    Ok((id, raw))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, UseCaseError> {
    serde_json::to_vec(value).map_err(|err| UseCaseError::Payload(err.to_string()))
}

pub struct ImageUseCase {
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn ObjectStore>,
    repo: Arc<dyn ImageRepository>,
    engine: Arc<TransformEngine>,
}

impl ImageUseCase {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn ObjectStore>,
        repo: Arc<dyn ImageRepository>,
        engine: Arc<TransformEngine>,
    ) -> ImageUseCase {
        ImageUseCase {
            publisher,
            store,
            repo,
            engine,
        }
    }

    /// Records an uploaded image and tells the user service about it.
    pub async fn create_image(
        &self,
        ctx: &Context,
        msg: &ConsumerMessage,
    ) -> Result<Image, UseCaseError> {
        let inbound: UploadImageMsg = serde_json::from_slice(&msg.data)
            .map_err(|err| UseCaseError::Payload(err.to_string()))?;

        let created = self
            .repo
            .create(&NewImage {
                image_url: inbound.image_url,
                is_uploaded: inbound.is_uploaded,
            })
            .await?;

        let body = encode(&UploadImageMsg {
            image_id: Some(created.image_id),
            user_id: inbound.user_id,
            image_url: created.image_url.clone(),
            is_uploaded: created.is_uploaded,
        })?;

        let mut outbound = PublishMessage::new(USERS_EXCHANGE, UPDATE_AVATAR_BINDING_KEY, body)
            .with_content_type(msg.content_type.clone());
        if let Some(user_uuid) = msg.header(USER_UUID_HEADER) {
            outbound = outbound.with_header(USER_UUID_HEADER, user_uuid);
        }

        self.publisher.publish(ctx, &outbound).await?;
        debug!(image_id = %created.image_id, "image record created");

        Ok(created)
    }

    /// Transforms an avatar upload, stores it and announces the new object.
    pub async fn resize_image(
        &self,
        ctx: &Context,
        msg: &ConsumerMessage,
    ) -> Result<String, UseCaseError> {
        let (user_id, user_uuid) = header_uuid(msg, USER_UUID_HEADER)?;

        let url = self.transform_and_store(msg).await?;

        let body = encode(&UploadImageMsg {
            image_id: None,
            user_id,
            image_url: url.clone(),
            is_uploaded: true,
        })?;

        let outbound = PublishMessage::new(IMAGES_EXCHANGE, CREATE_BINDING_KEY, body)
            .with_header(USER_UUID_HEADER, user_uuid)
            .with_content_type(msg.content_type.clone());

        self.publisher.publish(ctx, &outbound).await?;
        debug!(%user_id, %url, "avatar resized");

        Ok(url)
    }

    /// Transforms a hotel image upload, stores it and announces the new object.
    pub async fn process_hotel_image(
        &self,
        ctx: &Context,
        msg: &ConsumerMessage,
    ) -> Result<String, UseCaseError> {
        let (hotel_id, hotel_uuid) = header_uuid(msg, HOTEL_UUID_HEADER)?;

        let url = self.transform_and_store(msg).await?;

        let body = encode(&UpdateHotelImageMsg {
            hotel_id,
            image: url.clone(),
        })?;

        let outbound = PublishMessage::new(IMAGES_EXCHANGE, CREATE_BINDING_KEY, body)
            .with_header(HOTEL_UUID_HEADER, hotel_uuid)
            .with_content_type(msg.content_type.clone());

        self.publisher.publish(ctx, &outbound).await?;
        debug!(%hotel_id, %url, "hotel image processed");

        Ok(url)
    }

    pub async fn get_image_by_id(&self, image_id: Uuid) -> Result<Image, UseCaseError> {
        Ok(self.repo.get_by_id(image_id).await?)
    }

    async fn transform_and_store(&self, msg: &ConsumerMessage) -> Result<String, UseCaseError> {
        let (data, format) = {
            let processed = self.engine.process_async(msg.data.clone()).await?;
            (processed.bytes().to_vec(), processed.format())
        };

        Ok(self.store.put(data, format).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        images::{
            models::ImageFormatTag,
            pool::PipelinePool,
            repository::MockImageRepository,
            storage::MockObjectStore,
            transform::{Filter, Resampling},
        },
        messaging::publisher::MockPublisher,
    };
    use chrono::Utc;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::io::Cursor;

    const USER: &str = "11111111-1111-1111-1111-111111111111";
    const HOTEL: &str = "22222222-2222-2222-2222-222222222222";
    const ENDPOINT: &str = "http://localhost:9000/images";

    fn engine() -> Arc<TransformEngine> {
        let filters = vec![
            Filter::Resize {
                width: 16,
                height: 0,
                resampling: Resampling::Lanczos,
            },
            Filter::Contrast(20.0),
            Filter::Brightness(7.0),
            Filter::Gamma(0.5),
        ];
        Arc::new(TransformEngine::new(PipelinePool::new(filters, 2)))
    }

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_fn(32, 24, |x, y| {
            image::Rgba([x as u8 * 8, y as u8 * 10, 128, 255])
        });
        let dynamic = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut out = Cursor::new(vec![]);
        dynamic.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn usecase(
        publisher: MockPublisher,
        store: MockObjectStore,
        repo: MockImageRepository,
    ) -> ImageUseCase {
        ImageUseCase::new(Arc::new(publisher), Arc::new(store), Arc::new(repo), engine())
    }

    fn storing_mock() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, format| Ok(format!("{ENDPOINT}/new.{format}")));
        store
    }

    #[tokio::test]
    async fn resize_publishes_upload_msg_with_user_header() {
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .withf(|data, format| {
                *format == ImageFormatTag::Png
                    && image::load_from_memory_with_format(data, ImageFormat::Png).is_ok()
            })
            .times(1)
            .returning(|_, _| Ok(format!("{ENDPOINT}/new.png")));

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|_, msg| {
                let body: UploadImageMsg = serde_json::from_slice(&msg.data).unwrap();
                msg.to == IMAGES_EXCHANGE
                    && msg.key == CREATE_BINDING_KEY
                    && msg.headers.get(USER_UUID_HEADER).map(String::as_str) == Some(USER)
                    && msg.content_type.as_deref() == Some("image/png")
                    && body.user_id.to_string() == USER
                    && body.image_url == format!("{ENDPOINT}/new.png")
                    && body.is_uploaded
                    && body.image_id.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = usecase(publisher, store, MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", encoded(ImageFormat::Png))
            .with_header(USER_UUID_HEADER, USER)
            .with_content_type("image/png");

        let url = uc.resize_image(&Context::new(), &msg).await.unwrap();
        assert_eq!(url, format!("{ENDPOINT}/new.png"));
    }

    #[tokio::test]
    async fn resize_keeps_header_value_verbatim() {
        let upper = USER.to_uppercase();
        let expected = upper.clone();

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(move |_, msg| msg.headers.get(USER_UUID_HEADER) == Some(&expected))
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = usecase(publisher, storing_mock(), MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", encoded(ImageFormat::Jpeg))
            .with_header(USER_UUID_HEADER, &upper);

        assert!(uc.resize_image(&Context::new(), &msg).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_user_header_has_no_side_effects() {
        let mut store = MockObjectStore::new();
        store.expect_put().never();
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let uc = usecase(publisher, store, MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", encoded(ImageFormat::Jpeg))
            .with_header(USER_UUID_HEADER, "not-a-uuid");

        let err = uc.resize_image(&Context::new(), &msg).await.unwrap_err();
        assert!(matches!(err, UseCaseError::InvalidHeader(USER_UUID_HEADER, _)));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn missing_user_header_is_rejected() {
        let uc = usecase(MockPublisher::new(), MockObjectStore::new(), MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", encoded(ImageFormat::Png));

        let err = uc.resize_image(&Context::new(), &msg).await.unwrap_err();
        assert!(matches!(err, UseCaseError::InvalidHeader(_, _)));
    }

    #[tokio::test]
    async fn tiff_body_has_no_side_effects() {
        let mut store = MockObjectStore::new();
        store.expect_put().never();
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let mut tiff = b"II*\0".to_vec();
        tiff.extend_from_slice(&[0u8; 32]);

        let uc = usecase(publisher, store, MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", tiff).with_header(USER_UUID_HEADER, USER);

        let err = uc.resize_image(&Context::new(), &msg).await.unwrap_err();
        assert!(matches!(
            err,
            UseCaseError::Transform(TransformError::UnsupportedFormat(_))
        ));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn store_failure_skips_publish() {
        let mut store = MockObjectStore::new();
        store.expect_put().returning(|_, _| {
            Err(StorageError::Put("k".to_owned(), "connection refused".to_owned()))
        });
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let uc = usecase(publisher, store, MockImageRepository::new());
        let msg = ConsumerMessage::new("resize_queue", encoded(ImageFormat::Gif))
            .with_header(USER_UUID_HEADER, USER);

        let err = uc.resize_image(&Context::new(), &msg).await.unwrap_err();
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn create_persists_and_notifies_users() {
        let image_id = Uuid::new_v4();
        let url = format!("{ENDPOINT}/abc.png");

        let mut repo = MockImageRepository::new();
        let stored_url = url.clone();
        repo.expect_create()
            .withf(move |image| image.image_url == stored_url && image.is_uploaded)
            .times(1)
            .returning(move |image| {
                Ok(Image {
                    image_id,
                    image_url: image.image_url.clone(),
                    is_uploaded: image.is_uploaded,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });

        let mut publisher = MockPublisher::new();
        let published_url = url.clone();
        publisher
            .expect_publish()
            .withf(move |_, msg| {
                let body: UploadImageMsg = serde_json::from_slice(&msg.data).unwrap();
                msg.to == USERS_EXCHANGE
                    && msg.key == UPDATE_AVATAR_BINDING_KEY
                    && msg.headers.get(USER_UUID_HEADER).map(String::as_str) == Some(USER)
                    && msg.content_type.as_deref() == Some("application/json")
                    && body.image_id == Some(image_id)
                    && body.image_url == published_url
                    && body.user_id.to_string() == USER
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let inbound = serde_json::to_vec(&UploadImageMsg {
            image_id: None,
            user_id: Uuid::parse_str(USER).unwrap(),
            image_url: url.clone(),
            is_uploaded: true,
        })
        .unwrap();

        let uc = usecase(publisher, MockObjectStore::new(), repo);
        let msg = ConsumerMessage::new("create_queue", inbound)
            .with_header(USER_UUID_HEADER, USER)
            .with_content_type("application/json");

        let created = uc.create_image(&Context::new(), &msg).await.unwrap();
        assert_eq!(created.image_id, image_id);
        assert_eq!(created.image_url, url);
    }

    #[tokio::test]
    async fn create_with_invalid_json_is_permanent() {
        let mut repo = MockImageRepository::new();
        repo.expect_create().never();
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let uc = usecase(publisher, MockObjectStore::new(), repo);
        let msg = ConsumerMessage::new("create_queue", &b"{not json"[..]);

        let err = uc.create_image(&Context::new(), &msg).await.unwrap_err();
        assert!(matches!(err, UseCaseError::Payload(_)));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn hotel_image_publishes_hotel_msg() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|_, msg| {
                let body: UpdateHotelImageMsg = serde_json::from_slice(&msg.data).unwrap();
                msg.to == IMAGES_EXCHANGE
                    && msg.key == CREATE_BINDING_KEY
                    && msg.headers.get(HOTEL_UUID_HEADER).map(String::as_str) == Some(HOTEL)
                    && !msg.headers.contains_key(USER_UUID_HEADER)
                    && body.hotel_id.to_string() == HOTEL
                    && body.image == format!("{ENDPOINT}/new.jpeg")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = usecase(publisher, storing_mock(), MockImageRepository::new());
        let msg = ConsumerMessage::new("upload_hotel_image_queue", encoded(ImageFormat::Jpeg))
            .with_header(HOTEL_UUID_HEADER, HOTEL)
            .with_content_type("image/jpeg");

        let url = uc.process_hotel_image(&Context::new(), &msg).await.unwrap();
        assert_eq!(url, format!("{ENDPOINT}/new.jpeg"));
    }

    #[tokio::test]
    async fn hotel_image_requires_hotel_header() {
        let mut store = MockObjectStore::new();
        store.expect_put().never();

        let uc = usecase(MockPublisher::new(), store, MockImageRepository::new());
        let msg = ConsumerMessage::new("upload_hotel_image_queue", encoded(ImageFormat::Jpeg))
            .with_header(USER_UUID_HEADER, USER);

        let err = uc.process_hotel_image(&Context::new(), &msg).await.unwrap_err();
        assert!(matches!(err, UseCaseError::InvalidHeader(HOTEL_UUID_HEADER, _)));
    }

    #[tokio::test]
    async fn get_by_id_passes_not_found_through() {
        let mut repo = MockImageRepository::new();
        repo.expect_get_by_id().returning(|_| Err(RepositoryError::NotFound));

        let uc = usecase(MockPublisher::new(), MockObjectStore::new(), repo);
        let err = uc.get_image_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, UseCaseError::Repository(RepositoryError::NotFound)));
    }

    #[test]
    fn error_classification_maps_to_messaging_errors() {
        let permanent: MessagingError = UseCaseError::Payload("eof".to_owned()).into();
        assert!(permanent.is_permanent());

        let transient: MessagingError =
            UseCaseError::Messaging(MessagingError::PublishTimeout).into();
        assert_eq!(transient, MessagingError::HandlerError("publish timed out".to_owned()));

        let db: MessagingError =
            UseCaseError::Repository(RepositoryError::Database("down".to_owned())).into();
        assert!(!db.is_permanent());

        let oversized = UseCaseError::Transform(TransformError::TooLarge {
            width: 1024,
            height: 614_400,
        });
        assert!(oversized.is_permanent());
    }
}
