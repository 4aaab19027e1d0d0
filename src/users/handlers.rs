// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{
    dispatcher::WorkerDefinition,
    events::{UploadImageMsg, USER_UUID_HEADER},
    exchange::USERS_EXCHANGE,
    messaging::{
        errors::MessagingError,
        handler::{ConsumerHandler, ConsumerMessage},
    },
    queue::{AVATARS_CONSUMER_TAG, AVATARS_QUEUE, AVATARS_WORKERS, UPDATE_AVATAR_BINDING_KEY},
    topology::Declaration,
    users::repository::UserRepository,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Stores the URL of a processed avatar on the owning user.
pub struct UpdateUploadedAvatarHandler {
    repo: Arc<dyn UserRepository>,
}

impl UpdateUploadedAvatarHandler {
    pub fn new(repo: Arc<dyn UserRepository>) -> Arc<UpdateUploadedAvatarHandler> {
        Arc::new(UpdateUploadedAvatarHandler { repo })
    }
}

#[async_trait]
impl ConsumerHandler for UpdateUploadedAvatarHandler {
    async fn exec(&self, _ctx: &Context, msg: &ConsumerMessage) -> Result<(), MessagingError> {
        let upload: UploadImageMsg = serde_json::from_slice(&msg.data)
            .map_err(|err| MessagingError::PermanentHandlerError(err.to_string()))?;

        // the header, when present, must name the same user as the body
        if let Some(raw) = msg.header(USER_UUID_HEADER) {
            let header_id = Uuid::parse_str(raw).map_err(|err| {
                MessagingError::PermanentHandlerError(format!("{USER_UUID_HEADER}: {err}"))
            })?;
            if header_id != upload.user_id {
                return Err(MessagingError::PermanentHandlerError(format!(
                    "{USER_UUID_HEADER} {header_id} does not match user {}",
                    upload.user_id
                )));
            }
        }

        self.repo.update_avatar(upload.user_id, &upload.image_url).await?;
        debug!(user_id = %upload.user_id, image_url = %upload.image_url, "avatar updated");

        Ok(())
    }
}

pub fn worker_definition(repo: Arc<dyn UserRepository>) -> WorkerDefinition {
    WorkerDefinition::new(
        Declaration::direct(USERS_EXCHANGE, AVATARS_QUEUE, UPDATE_AVATAR_BINDING_KEY),
        AVATARS_CONSUMER_TAG,
        AVATARS_WORKERS,
        UpdateUploadedAvatarHandler::new(repo),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{persistence::RepositoryError, users::repository::MockUserRepository};

    const USER: &str = "11111111-1111-1111-1111-111111111111";
    const URL: &str = "http://localhost:9000/images/a.png";

    fn body(user: &str) -> Vec<u8> {
        serde_json::to_vec(&UploadImageMsg {
            image_id: Some(Uuid::new_v4()),
            user_id: Uuid::parse_str(user).unwrap(),
            image_url: URL.to_owned(),
            is_uploaded: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn updates_avatar_of_body_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_update_avatar()
            .withf(|user_id, url| user_id.to_string() == USER && url == URL)
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = UpdateUploadedAvatarHandler::new(Arc::new(repo));
        let msg =
            ConsumerMessage::new(AVATARS_QUEUE, body(USER)).with_header(USER_UUID_HEADER, USER);

        assert!(handler.exec(&Context::new(), &msg).await.is_ok());
    }

    #[tokio::test]
    async fn header_is_optional() {
        let mut repo = MockUserRepository::new();
        repo.expect_update_avatar().times(1).returning(|_, _| Ok(()));

        let handler = UpdateUploadedAvatarHandler::new(Arc::new(repo));
        let msg = ConsumerMessage::new(AVATARS_QUEUE, body(USER));

        assert!(handler.exec(&Context::new(), &msg).await.is_ok());
    }

    #[tokio::test]
    async fn mismatched_header_is_rejected() {
        let mut repo = MockUserRepository::new();
        repo.expect_update_avatar().never();

        let handler = UpdateUploadedAvatarHandler::new(Arc::new(repo));
        let msg = ConsumerMessage::new(AVATARS_QUEUE, body(USER))
            .with_header(USER_UUID_HEADER, "22222222-2222-2222-2222-222222222222");

        let err = handler.exec(&Context::new(), &msg).await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn unknown_user_is_permanent_and_db_failure_is_not() {
        let mut repo = MockUserRepository::new();
        repo.expect_update_avatar().times(1).returning(|_, _| Err(RepositoryError::NotFound));
        let handler = UpdateUploadedAvatarHandler::new(Arc::new(repo));
        let err = handler
            .exec(&Context::new(), &ConsumerMessage::new(AVATARS_QUEUE, body(USER)))
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        let mut repo = MockUserRepository::new();
        repo.expect_update_avatar()
            .times(1)
            .returning(|_, _| Err(RepositoryError::Database("timeout".to_owned())));
        let handler = UpdateUploadedAvatarHandler::new(Arc::new(repo));
        let err = handler
            .exec(&Context::new(), &ConsumerMessage::new(AVATARS_QUEUE, body(USER)))
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn consumes_avatars_queue() {
        let def = worker_definition(Arc::new(MockUserRepository::new()));
        assert_eq!(def.queue(), "avatars_queue");
        assert_eq!(def.declaration.exchange.name(), "users");
        assert_eq!(def.declaration.binding.key(), "update_avatar_key");
        assert_eq!(def.pool_size, 5);
    }
}
