// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! S3-compatible object store for processed images.
//!
//! Every `put` mints a new `<uuid>.<format>` key, so a stored URL never changes
//! content.

use crate::{configs::S3Configs, images::models::ImageFormatTag};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::ObjectCannedAcl,
    Client,
};
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("failure to put object `{0}`: {1}")]
    Put(String, String),

    #[error("failure to get object `{0}`: {1}")]
    Get(String, String),

    #[error("failure to delete object `{0}`: {1}")]
    Delete(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under a fresh key and returns its public URL.
    async fn put(&self, data: Vec<u8>, format: ImageFormatTag) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub(crate) fn object_key(id: Uuid, format: ImageFormatTag) -> String {
    format!("{}.{}", id, format.as_str())
}

pub(crate) fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
}

/// Content type implied by a `<uuid>.<format>` key.
pub(crate) fn content_type_of(key: &str) -> Option<String> {
    let (_, ext) = key.rsplit_once('.')?;
    let format: ImageFormatTag = ext.parse().ok()?;
    Some(format.content_type().to_owned())
}

pub struct S3ObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, cfg: &S3Configs) -> S3ObjectStore {
        S3ObjectStore {
            client,
            endpoint: cfg.endpoint.clone(),
            bucket: cfg.bucket.clone(),
        }
    }

    /// Builds a path-style client for the configured endpoint.
    ///
    /// Static credentials are used when both keys are set, otherwise the default
    /// provider chain.
    pub async fn client(cfg: &S3Configs) -> Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .endpoint_url(&cfg.endpoint);

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&cfg.access_key_id, &cfg.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "images_s3",
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Client::from_conf(s3_config)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, data: Vec<u8>, format: ImageFormatTag) -> Result<String, StorageError> {
        let key = object_key(Uuid::new_v4(), format);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(format.content_type())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| StorageError::Put(key.clone(), err.to_string()))?;

        debug!(bucket = %self.bucket, %key, size, "object stored");

        Ok(object_url(&self.endpoint, &self.bucket, &key))
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::Get(key.to_owned(), err.to_string()))?;

        let content_type = response
            .content_type()
            .map(str::to_owned)
            .or_else(|| content_type_of(key));
        let body = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Get(key.to_owned(), err.to_string()))?;

        Ok(StoredObject {
            data: body.into_bytes(),
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::Delete(key.to_owned(), err.to_string()))?;

        debug!(bucket = %self.bucket, key, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_uuid_and_format() {
        let id = Uuid::parse_str("33333333-3333-3333-3333-333333333333").unwrap();
        assert_eq!(
            object_key(id, ImageFormatTag::Jpeg),
            "33333333-3333-3333-3333-333333333333.jpeg"
        );
    }

    #[test]
    fn content_type_follows_key_extension() {
        assert_eq!(content_type_of("a.jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(content_type_of("b.gif").as_deref(), Some("image/gif"));
        assert_eq!(content_type_of("c.tiff"), None);
        assert_eq!(content_type_of("noext"), None);
    }

    #[test]
    fn url_joins_endpoint_bucket_and_key() {
        assert_eq!(
            object_url("http://localhost:9000/", "images", "a.png"),
            "http://localhost:9000/images/a.png"
        );
        assert_eq!(
            object_url("http://minio:9000", "images", "b.gif"),
            "http://minio:9000/images/b.gif"
        );
    }
}
