// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::persistence::RepositoryError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;
use uuid::Uuid;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HotelRepository: Send + Sync {
    async fn update_image(&self, hotel_id: Uuid, url: &str) -> Result<(), RepositoryError>;
}

pub struct PgHotelRepository {
    pool: PgPool,
}

impl PgHotelRepository {
    pub fn new(pool: PgPool) -> PgHotelRepository {
        PgHotelRepository { pool }
    }
}

const UPDATE_IMAGE: &str = "UPDATE hotels SET image = $2, updated_at = NOW() WHERE hotel_id = $1";

#[async_trait]
impl HotelRepository for PgHotelRepository {
    async fn update_image(&self, hotel_id: Uuid, url: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(UPDATE_IMAGE)
            .bind(hotel_id)
            .bind(url)
            .execute(&self.pool)
            .await?;

        match result.rows_affected() {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }
}
