use crate::{
    error::{AppError, Result},
    models::{
        collections,
        event::ChangeKind,
        like::{Like, NewLike},
        post::Post,
    },
    services::{events::EventDispatcher, Database},
    utils::validation::validate_document_id,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct LikeService {
    db: Arc<Database>,
    events: EventDispatcher,
}

impl LikeService {
    pub async fn new(db: Arc<Database>, events: EventDispatcher) -> Result<Self> {
        Ok(Self { db, events })
    }

    /// 点赞 ID 由 (用户, 帖子) 决定，重复点赞在存储层直接冲突
    pub async fn like_post(&self, user_id: &str, post_id: &str) -> Result<Like> {
        debug!("User {} liking post {}", user_id, post_id);
        validate_document_id(post_id)?;

        self.db
            .get_by_id::<Post>(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post"))?;

        let new_like = NewLike {
            user_id: user_id.to_string(),
            post_id: post_id.to_string(),
        };
        let like: Like = match self.db.create(&Like::like_id(user_id, post_id), &new_like).await {
            Ok(like) => like,
            Err(AppError::Conflict(_)) => return Err(AppError::conflict("Post already liked")),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.events.publish_change(ChangeKind::Created, &like) {
            warn!("Failed to publish like event: {}", e);
        }

        info!("User {} liked post {}", user_id, post_id);
        Ok(like)
    }

    pub async fn unlike_post(&self, user_id: &str, post_id: &str) -> Result<()> {
        debug!("User {} unliking post {}", user_id, post_id);

        let like_id = Like::like_id(user_id, post_id);
        let like: Like = self
            .db
            .get_by_id(&like_id)
            .await?
            .ok_or_else(|| AppError::not_found("Like"))?;

        if self.db.delete_by_id(collections::LIKES, &like_id).await? {
            if let Err(e) = self.events.publish_change(ChangeKind::Deleted, &like) {
                warn!("Failed to publish like event: {}", e);
            }
        }

        info!("User {} unliked post {}", user_id, post_id);
        Ok(())
    }
}
