use crate::{
    error::{AppError, Result},
    models::{
        deletion::CascadeReport,
        pagination::{Hydrated, Page, PageRequest},
        post::{FeedScope, Post},
    },
    services::{
        cascade::CascadeService, database::Filter, follow::FollowService, pagination::Paginator,
        Database,
    },
};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    follows: FollowService,
    cascade: CascadeService,
    paginator: Paginator,
}

impl PostService {
    pub async fn new(db: Arc<Database>, follows: FollowService, cascade: CascadeService) -> Result<Self> {
        Ok(Self {
            paginator: Paginator::new(db.clone()),
            db,
            follows,
            cascade,
        })
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        self.db
            .get_by_id::<Post>(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post"))
    }

    pub async fn get_feed(&self, scope: &FeedScope, request: &PageRequest) -> Result<Page<Hydrated<Post>>> {
        debug!("Loading feed: {:?}", scope);

        let filters = match scope {
            FeedScope::All => Vec::new(),
            FeedScope::Author(author_id) => vec![Filter::eq("authorId", author_id.as_str())],
            FeedScope::Following(viewer_id) => {
                // 关注列表不分页；自己的帖子也出现在信息流中
                let mut author_ids = self.follows.following_ids(viewer_id).await?;
                author_ids.push(viewer_id.clone());
                vec![Filter::is_in("authorId", author_ids)]
            }
        };

        let page = self.paginator.paginate::<Post>(filters, request).await?;
        self.paginator
            .hydrate(page, |post| post.author_id.as_str())
            .await
    }

    /// 只有作者可以删除帖子；删除会级联到评论、点赞和图片
    pub async fn delete_post(&self, post_id: &str, user_id: &str) -> Result<CascadeReport> {
        if let Some(post) = self.db.get_by_id::<Post>(post_id).await? {
            if post.author_id != user_id {
                return Err(AppError::forbidden("You can only delete your own posts"));
            }
        }

        let report = self.cascade.delete_post(post_id).await?;
        info!("User {} deleted post {}", user_id, post_id);
        Ok(report)
    }
}
