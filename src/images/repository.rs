// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{
    images::models::{Image, NewImage},
    persistence::RepositoryError,
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;
use uuid::Uuid;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Inserts a record; id and timestamps are assigned by the database.
    async fn create(&self, image: &NewImage) -> Result<Image, RepositoryError>;

    async fn get_by_id(&self, image_id: Uuid) -> Result<Image, RepositoryError>;
}

pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> PgImageRepository {
        PgImageRepository { pool }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    async fn create(&self, image: &NewImage) -> Result<Image, RepositoryError> {
        let created = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (image_url, is_uploaded)
            VALUES ($1, $2)
            RETURNING image_id, image_url, is_uploaded, created_at, updated_at
            "#,
        )
        .bind(&image.image_url)
        .bind(image.is_uploaded)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_by_id(&self, image_id: Uuid) -> Result<Image, RepositoryError> {
        sqlx::query_as::<_, Image>(
            r#"
            SELECT image_id, image_url, is_uploaded, created_at, updated_at
            FROM images
            WHERE image_id = $1
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
