use crate::{
    error::{AppError, Result},
    models::{
        collections,
        comment::*,
        event::ChangeKind,
        pagination::{Hydrated, Page, PageRequest},
        post::Post,
    },
    services::{database::Filter, events::EventDispatcher, pagination::Paginator, Database},
    utils::validation::{validate_comment_text, validate_document_id},
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct CommentService {
    db: Arc<Database>,
    events: EventDispatcher,
    paginator: Paginator,
    max_comment_length: usize,
}

impl CommentService {
    pub async fn new(db: Arc<Database>, events: EventDispatcher, max_comment_length: usize) -> Result<Self> {
        Ok(Self {
            paginator: Paginator::new(db.clone()),
            db,
            events,
            max_comment_length,
        })
    }

    pub async fn create_comment(
        &self,
        user_id: &str,
        post_id: &str,
        request: CreateCommentRequest,
    ) -> Result<Comment> {
        debug!("Creating comment for post: {}", post_id);

        request.validate().map_err(AppError::ValidatorError)?;
        validate_comment_text(&request.text, self.max_comment_length)?;
        validate_document_id(post_id)?;

        self.db
            .get_by_id::<Post>(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post"))?;

        let new_comment = NewComment {
            post_id: post_id.to_string(),
            author_id: user_id.to_string(),
            text: request.text,
        };
        let comment: Comment = self
            .db
            .create(&Uuid::new_v4().to_string(), &new_comment)
            .await?;

        // 副作用失败不影响评论本身
        if let Err(e) = self.events.publish_change(ChangeKind::Created, &comment) {
            warn!("Failed to publish comment event: {}", e);
        }

        info!("Created comment {} on post {}", comment.id, post_id);
        Ok(comment)
    }

    pub async fn delete_comment(&self, comment_id: &str, user_id: &str) -> Result<()> {
        debug!("Deleting comment: {}", comment_id);

        let comment: Comment = self
            .db
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))?;

        if comment.author_id != user_id {
            return Err(AppError::forbidden("You can only delete your own comments"));
        }

        if self.db.delete_by_id(collections::COMMENTS, comment_id).await? {
            if let Err(e) = self.events.publish_change(ChangeKind::Deleted, &comment) {
                warn!("Failed to publish comment event: {}", e);
            }
        }

        info!("Deleted comment {}", comment_id);
        Ok(())
    }

    pub async fn list_post_comments(
        &self,
        post_id: &str,
        request: &PageRequest,
    ) -> Result<Page<Hydrated<Comment>>> {
        debug!("Listing comments for post: {}", post_id);

        let page = self
            .paginator
            .paginate::<Comment>(vec![Filter::eq("postId", post_id)], request)
            .await?;
        self.paginator
            .hydrate(page, |comment| comment.author_id.as_str())
            .await
    }
}
