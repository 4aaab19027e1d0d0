// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Postgres pool construction, schema migrations and the repository error type
//! shared by the image, user and hotel repositories.

use crate::{configs::PostgresConfigs, messaging::errors::MessagingError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

impl From<RepositoryError> for MessagingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => MessagingError::PermanentHandlerError(err.to_string()),
            RepositoryError::Database(_) => MessagingError::HandlerError(err.to_string()),
        }
    }
}

/// Connects the pool and applies pending migrations.
pub async fn connect(cfg: &PostgresConfigs) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&cfg.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database migrations applied");

    Ok(pool)
}
