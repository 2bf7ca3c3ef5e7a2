use crate::{
    error::{AppError, Result},
    models::{
        collections,
        event::ChangeKind,
        follow::*,
        pagination::{Hydrated, Page, PageRequest},
        user::User,
    },
    services::{database::{Filter, Query}, events::EventDispatcher, pagination::Paginator, Database},
    utils::validation::validate_document_id,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct FollowService {
    db: Arc<Database>,
    events: EventDispatcher,
    paginator: Paginator,
}

impl FollowService {
    pub async fn new(db: Arc<Database>, events: EventDispatcher) -> Result<Self> {
        Ok(Self {
            paginator: Paginator::new(db.clone()),
            db,
            events,
        })
    }

    pub async fn follow_user(&self, follower_id: &str, following_id: &str) -> Result<Follow> {
        debug!("User {} following user {}", follower_id, following_id);
        validate_document_id(following_id)?;

        // 防止自己关注自己
        if follower_id == following_id {
            return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
        }

        // 检查被关注用户是否存在
        self.db
            .get_by_id::<User>(following_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        // 关注关系的 ID 由有序的 (关注者, 被关注者) 决定，保证唯一
        let new_follow = NewFollow {
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
        };
        let follow: Follow = match self
            .db
            .create(&Follow::edge_id(follower_id, following_id), &new_follow)
            .await
        {
            Ok(follow) => follow,
            Err(AppError::Conflict(_)) => {
                return Err(AppError::Conflict("Already following this user".to_string()))
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.events.publish_change(ChangeKind::Created, &follow) {
            warn!("Failed to publish follow event: {}", e);
        }

        info!("User {} followed user {}", follower_id, following_id);
        Ok(follow)
    }

    pub async fn unfollow_user(&self, follower_id: &str, following_id: &str) -> Result<()> {
        debug!("User {} unfollowing user {}", follower_id, following_id);

        let edge_id = Follow::edge_id(follower_id, following_id);
        let follow: Follow = self
            .db
            .get_by_id(&edge_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Not following this user".to_string()))?;

        if self.db.delete_by_id(collections::FOLLOWS, &edge_id).await? {
            if let Err(e) = self.events.publish_change(ChangeKind::Deleted, &follow) {
                warn!("Failed to publish follow event: {}", e);
            }
        }

        info!("User {} unfollowed user {}", follower_id, following_id);
        Ok(())
    }

    /// 关注某用户的人，附带关注者的公开资料
    pub async fn get_followers(&self, user_id: &str, request: &PageRequest) -> Result<Page<Hydrated<Follow>>> {
        let page = self
            .paginator
            .paginate::<Follow>(vec![Filter::eq("followingId", user_id)], request)
            .await?;
        self.paginator
            .hydrate(page, |follow| follow.follower_id.as_str())
            .await
    }

    /// 某用户关注的人，附带被关注者的公开资料
    pub async fn get_following(&self, user_id: &str, request: &PageRequest) -> Result<Page<Hydrated<Follow>>> {
        let page = self
            .paginator
            .paginate::<Follow>(vec![Filter::eq("followerId", user_id)], request)
            .await?;
        self.paginator
            .hydrate(page, |follow| follow.following_id.as_str())
            .await
    }

    /// 某用户关注的全部用户 ID（不分页）
    pub async fn following_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let query = Query::new(collections::FOLLOWS)
            .filter(Filter::eq("followerId", user_id));
        Ok(self
            .db
            .find::<Follow>(&query)
            .await?
            .into_iter()
            .map(|follow| follow.following_id)
            .collect())
    }
}
